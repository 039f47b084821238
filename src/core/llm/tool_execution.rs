//! Execute a single tool call from the agent loop.

use serde_json::{Value, json};

use crate::core::tools::WebSearchTool;

/// Max size of a tool result fed back to the model (16 KB).
const MAX_TOOL_OUTPUT: usize = 16 * 1024;

/// Truncate a tool result string to the given max bytes, appending a notice.
pub(crate) fn truncate_tool_output(output: String, max_bytes: usize) -> String {
    if output.len() <= max_bytes {
        return output;
    }
    let total = output.len();
    let mut end = max_bytes;
    while end > 0 && !output.is_char_boundary(end) {
        end -= 1;
    }
    format!(
        "{}\n\n[... truncated, {} bytes total]",
        &output[..end],
        total
    )
}

/// Format a tool error as text for the model. Logs the underlying error.
pub(crate) fn tool_result_string(
    res: Result<String, Box<dyn std::error::Error + Send + Sync>>,
    tool_name: &str,
) -> String {
    match res {
        Ok(s) => s,
        Err(e) => {
            log::warn!("Tool {} error: {}", tool_name, e);
            format!("Error: {}", e)
        }
    }
}

/// Assistant message that carries the tool calls, sent back with the results.
pub(super) fn assistant_tool_message(content: &str, tool_calls: &[Value]) -> Value {
    json!({
        "role": "assistant",
        "content": content,
        "tool_calls": tool_calls.iter().map(|tc| json!({
            "id": tc["id"].as_str().unwrap_or(""),
            "type": "function",
            "function": tc["function"].clone()
        })).collect::<Vec<_>>()
    })
}

/// Execute one tool call and return the `tool` role message holding its result.
/// Failures are reported to the model as text, never raised.
pub(super) async fn execute_tool_call(
    tool_call: &Value,
    tool: &WebSearchTool,
    on_progress: Option<&(dyn Fn(&str) + Send + Sync)>,
) -> Value {
    let id = tool_call["id"].as_str().unwrap_or_default();
    let function = &tool_call["function"];
    let name = function["name"].as_str().unwrap_or_default();
    let args_str = function["arguments"].as_str().unwrap_or("{}");

    let result = match serde_json::from_str::<Value>(args_str) {
        Err(e) => {
            log::warn!("Tool {} sent invalid arguments: {}", name, e);
            format!("Error: invalid JSON arguments: {}", e)
        }
        Ok(_) if name != tool.name() => format!("Error: unknown tool '{}'", name),
        Ok(args) => {
            if let Some(progress) = on_progress {
                progress(&format!("→ {}: {}", name, tool.args_preview(&args)));
            }
            tool_result_string(tool.execute(&args).await, name)
        }
    };

    tool_message(id, result)
}

/// Tool result message answering `tool_call_id`.
pub(super) fn tool_message(tool_call_id: &str, content: String) -> Value {
    json!({
        "role": "tool",
        "tool_call_id": tool_call_id,
        "content": truncate_tool_output(content, MAX_TOOL_OUTPUT),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SearchConfig;

    fn offline_tool() -> WebSearchTool {
        WebSearchTool::new(&SearchConfig {
            endpoint: "http://127.0.0.1:9".to_string(),
            subscription_key: "k".to_string(),
        })
    }

    fn call(name: &str, args: &str) -> Value {
        json!({"id": "call_1", "type": "function", "function": {"name": name, "arguments": args}})
    }

    #[test]
    fn truncate_tool_output_under_limit() {
        let s = "short output";
        assert_eq!(truncate_tool_output(s.to_string(), 100), s);
    }

    #[test]
    fn truncate_tool_output_over_limit() {
        let s = "a".repeat(50);
        let result = truncate_tool_output(s, 20);
        assert!(result.contains("[... truncated, 50 bytes total]"));
    }

    #[test]
    fn truncate_tool_output_utf8_boundary() {
        let s = "é".repeat(10);
        let result = truncate_tool_output(s, 5);
        assert!(result.starts_with("éé\n"));
    }

    #[test]
    fn assistant_message_keeps_ids_and_functions() {
        let msg = assistant_tool_message("", &[call("bing_web_search", "{\"query\":\"x\"}")]);
        assert_eq!(msg["role"], "assistant");
        assert_eq!(msg["tool_calls"][0]["id"], "call_1");
        assert_eq!(msg["tool_calls"][0]["function"]["name"], "bing_web_search");
    }

    #[tokio::test]
    async fn invalid_arguments_become_tool_text() {
        let msg = execute_tool_call(&call("bing_web_search", "{not json"), &offline_tool(), None).await;
        assert_eq!(msg["role"], "tool");
        assert_eq!(msg["tool_call_id"], "call_1");
        assert!(msg["content"].as_str().unwrap().starts_with("Error: invalid JSON"));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported() {
        let msg = execute_tool_call(&call("Bash", "{}"), &offline_tool(), None).await;
        assert_eq!(msg["content"], "Error: unknown tool 'Bash'");
    }

    #[tokio::test]
    async fn empty_query_is_reported_to_model() {
        let msg =
            execute_tool_call(&call("bing_web_search", "{\"query\":\" \"}"), &offline_tool(), None)
                .await;
        assert_eq!(msg["content"], "Error: Search query must not be empty");
    }
}
