//! Bing Web Search v7: request, result parsing, and HTML/Markdown tables.

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::core::config::SearchConfig;

use super::tool_definition;

pub const TOOL_NAME: &str = "bing_web_search";

/// Upper bound on one Bing request, connect to last byte.
const SEARCH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

const QUERY_HELP: &str = "The user's search query term. Supports advanced search keywords: \
contains:, ext:, filetype:, inanchor:, inbody:, intitle:, ip:, language:, loc:/location:, \
prefer:, site:, feed:, hasfeed:, url:. Example: \"heart disease\" (site:bbc.co.uk OR site:cnn.com)";

/// Errors from a web search call.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Web search is not configured: set BING_SUBSCRIPTION_KEY")]
    NotConfigured,
    #[error("Search query must not be empty")]
    EmptyQuery,
    #[error("Web search failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Optional query parameters. Unset fields are omitted from the request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchOptions {
    pub answer_count: Option<u32>,
    #[serde(alias = "cc")]
    pub country_code: Option<String>,
    pub count: Option<u32>,
    pub freshness: Option<String>,
    #[serde(alias = "mkt")]
    pub market: Option<String>,
    pub offset: Option<u32>,
    pub promote: Option<Vec<String>>,
    pub response_filter: Option<Vec<String>>,
    pub safe_search: Option<String>,
    #[serde(alias = "setLang")]
    pub set_language: Option<String>,
    pub text_decorations: Option<bool>,
    pub text_format: Option<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            answer_count: None,
            country_code: None,
            count: Some(50),
            freshness: None,
            market: Some("en-US".to_string()),
            offset: None,
            promote: None,
            response_filter: None,
            safe_search: Some("Off".to_string()),
            set_language: None,
            text_decorations: Some(true),
            text_format: Some("HTML".to_string()),
        }
    }
}

impl SearchOptions {
    /// Query string pairs in Bing's parameter names, `q` first.
    pub fn query_pairs(&self, query: &str) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("q", query.to_string())];
        let mut push = |key: &'static str, value: Option<String>| {
            if let Some(v) = value {
                pairs.push((key, v));
            }
        };
        push("answerCount", self.answer_count.map(|v| v.to_string()));
        push("cc", self.country_code.clone());
        push("count", self.count.map(|v| v.to_string()));
        push("freshness", self.freshness.clone());
        push("mkt", self.market.clone());
        push("offset", self.offset.map(|v| v.to_string()));
        push("promote", self.promote.as_ref().map(|v| v.join(",")));
        push("responseFilter", self.response_filter.as_ref().map(|v| v.join(",")));
        push("safeSearch", self.safe_search.clone());
        push("setLang", self.set_language.clone());
        push("textDecorations", self.text_decorations.map(|v| v.to_string()));
        push("textFormat", self.text_format.clone());
        pairs
    }
}

/// Tool call arguments as sent by the model.
#[derive(Debug, Deserialize)]
pub struct WebSearchArgs {
    pub query: String,
    #[serde(flatten)]
    pub options: SearchOptions,
}

/// One row of search results.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub date_published: Option<NaiveDate>,
    pub freshness: Option<String>,
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(|s| s.as_str()).map(String::from)
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d").ok()
}

/// Extract `webPages.value[]` rows from a Bing response.
pub fn parse_results(body: &Value) -> Vec<SearchResult> {
    let Some(pages) = body["webPages"]["value"].as_array() else {
        return Vec::new();
    };
    pages
        .iter()
        .map(|v| SearchResult {
            title: str_field(v, "name").unwrap_or_else(|| "Name not available".to_string()),
            url: str_field(v, "url").unwrap_or_else(|| "URL not available".to_string()),
            snippet: str_field(v, "snippet")
                .unwrap_or_else(|| "Snippet not available".to_string()),
            date_published: v
                .get("datePublished")
                .and_then(|d| d.as_str())
                .and_then(parse_date),
            freshness: str_field(v, "datePublishedFreshnessText"),
        })
        .collect()
}

fn date_cell(r: &SearchResult) -> String {
    r.date_published
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "Date not available".to_string())
}

fn freshness_cell(r: &SearchResult) -> &str {
    r.freshness.as_deref().unwrap_or("Not available")
}

/// Render results as an HTML table.
pub fn render_html(results: &[SearchResult]) -> String {
    let header =
        "<tr><th>URL</th><th>Snippet</th><th>Date Published</th><th>Result Freshness</th></tr>";
    let rows = if results.is_empty() {
        "No results found.".to_string()
    } else {
        results
            .iter()
            .map(|r| {
                format!(
                    "<tr><td><a href=\"{}\">{}</a></td><td>{}</td><td>{}</td><td>{}</td></tr>",
                    r.url.replace('"', "%22"),
                    r.title,
                    r.snippet,
                    date_cell(r),
                    freshness_cell(r)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!("<table>{}{}</table>", header, rows)
}

fn md_cell(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}

/// Render results as a Markdown table.
pub fn render_markdown(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No results found.".to_string();
    }
    let mut out = String::from(
        "| Title | Snippet | Date Published | Result Freshness |\n|---|---|---|---|\n",
    );
    for r in results {
        out.push_str(&format!(
            "| [{}]({}) | {} | {} | {} |\n",
            md_cell(&r.title),
            r.url,
            md_cell(&r.snippet),
            date_cell(r),
            md_cell(freshness_cell(r))
        ));
    }
    out
}

/// Bing Web Search client, also exposed to the model as a function tool.
#[derive(Debug, Clone)]
pub struct WebSearchTool {
    client: reqwest::Client,
    endpoint: String,
    subscription_key: String,
}

impl WebSearchTool {
    pub fn new(config: &SearchConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(SEARCH_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("search client without timeout: {}", e);
                reqwest::Client::new()
            });
        Self {
            client,
            endpoint: config.endpoint.clone(),
            subscription_key: config.subscription_key.clone(),
        }
    }

    /// Build from optional config, failing when search credentials are absent.
    pub fn from_config(config: Option<&SearchConfig>) -> Result<Self, SearchError> {
        config.map(Self::new).ok_or(SearchError::NotConfigured)
    }

    pub fn name(&self) -> &'static str {
        TOOL_NAME
    }

    pub fn definition(&self) -> Value {
        tool_definition(
            self.name(),
            "Perform a search with the Bing Web Search API. Input should be a well written \
             search query using advanced search keywords where useful, plus optional query \
             parameters.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": QUERY_HELP,
                        "minLength": 1
                    },
                    "count": {"type": "integer", "description": "Number of results to return (max 50)."},
                    "freshness": {"type": "string", "description": "Filter by age: Day, Week, Month, or a date range."},
                    "mkt": {"type": "string", "description": "Market for the results, e.g. en-US."},
                    "cc": {"type": "string", "description": "2-character country code."},
                    "safeSearch": {"type": "string", "enum": ["Off", "Moderate", "Strict"]}
                },
                "required": ["query"]
            }),
        )
    }

    pub fn args_preview(&self, args: &Value) -> String {
        super::str_arg(args, "query")
    }

    pub async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        log::debug!("web search: {}", query);
        let body: Value = self
            .client
            .get(&self.endpoint)
            .header("Ocp-Apim-Subscription-Key", &self.subscription_key)
            .query(&options.query_pairs(query))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(parse_results(&body))
    }

    /// Run a tool call from the model; returns the Markdown table for the reply.
    pub async fn execute(&self, args: &Value) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let parsed: WebSearchArgs = serde_json::from_value(args.clone())
            .map_err(|e| format!("Invalid arguments: {}", e))?;
        let results = self.search(&parsed.query, &parsed.options).await?;
        Ok(render_markdown(&results))
    }
}
