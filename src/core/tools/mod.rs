pub mod web_search;

use serde_json::{Value, json};

pub use web_search::{SearchError, SearchOptions, SearchResult, WebSearchTool};

/// Helper to extract a string argument from tool args JSON.
pub fn str_arg(args: &Value, key: &str) -> String {
    args.get(key).and_then(|v| v.as_str()).unwrap_or("").to_string()
}

/// Helper to build the standard tool definition structure for the API.
pub fn tool_definition(name: &str, description: &str, parameters: Value) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": name,
            "description": description,
            "parameters": parameters
        }
    })
}
