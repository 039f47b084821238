//! Chat and API error types.

use std::time::Duration;

use crate::core::models::RegistryError;
use crate::core::tokens::TokenError;

/// Errors from the chat pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Tokens(#[from] TokenError),
    #[error("{name} = {value} is outside the allowed range [{min}, {max}]")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    /// Passed through unchanged; retrying is the caller's decision.
    #[error("Rate limited: {0}")]
    RateLimited(String),
    #[error("{0}")]
    ApiAuth(String),
    #[error("API error: {0}")]
    ApiMessage(String),
    #[error("No response within {0:?}")]
    Timeout(Duration),
    /// The request was cancelled before any response arrived.
    #[error("Request cancelled")]
    Cancelled,
    #[error("{0}")]
    Other(Box<dyn std::error::Error + Send + Sync + 'static>),
}

fn extract_json_message(s: &str) -> Option<String> {
    if !s.contains("\"error\"") {
        return None;
    }
    let (_, rest) = s.split_once("\"message\":\"")?;
    let (msg, _) = rest.split_once('"')?;
    Some(msg.to_string())
}

/// True when `s` reports HTTP status `code` as a status, not as any digit run.
fn has_status(s: &str, code: u16) -> bool {
    let anchored = [
        format!("status code: {}", code),
        format!("status: {}", code),
        format!("\"code\":\"{}\"", code),
        format!("\"code\": \"{}\"", code),
        format!("\"code\":{}", code),
        format!("\"statusCode\": {}", code),
        format!("\"statusCode\":{}", code),
        format!("HTTP {}", code),
    ];
    anchored.iter().any(|p| s.contains(p.as_str())) || s.starts_with(&format!("{}:", code))
}

fn is_rate_limited(s: &str) -> bool {
    let lower = s.to_lowercase();
    has_status(s, 429)
        || lower.contains("rate limit")
        || lower.contains("rate_limit_exceeded")
        || lower.contains("too many requests")
}

fn is_unauthorized(s: &str) -> bool {
    has_status(s, 401)
        || s.to_lowercase()
            .contains("access denied due to invalid subscription key")
}

/// Map async-openai or API errors into ChatError.
pub fn map_api_error<E>(e: E) -> ChatError
where
    E: std::fmt::Display + Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
{
    let s = e.to_string();
    if is_rate_limited(&s) {
        return ChatError::RateLimited(extract_json_message(&s).unwrap_or(s));
    }
    if is_unauthorized(&s) {
        return ChatError::ApiAuth(
            "API error (401): the gateway rejected the key. Check APIM_KEY and APIM_ENDPOINT in .env."
                .to_string(),
        );
    }
    if let Some(msg) = extract_json_message(&s) {
        return ChatError::ApiMessage(msg);
    }
    ChatError::Other(e.into())
}
