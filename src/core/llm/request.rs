//! Sampling parameters and the chat-completions request body.

use serde_json::{Value, json};

use crate::core::config::SamplingOverrides;
use crate::core::models::{EngineParameters, ParamBounds};

use super::ChatError;

/// User-chosen sampling settings for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
    pub stop: Option<Vec<String>>,
}

impl SamplingParams {
    /// The engine's configured defaults.
    pub fn defaults_for(engine: &EngineParameters) -> Self {
        Self {
            temperature: engine.temperature.default,
            max_tokens: engine.max_tokens.default,
            top_p: engine.top_p.default,
            frequency_penalty: engine.frequency_penalty.default,
            presence_penalty: engine.presence_penalty.default,
            stop: None,
        }
    }

    /// Replace fields that are set in `overrides`.
    pub fn with_overrides(mut self, overrides: &SamplingOverrides) -> Self {
        if let Some(v) = overrides.temperature {
            self.temperature = v;
        }
        if let Some(v) = overrides.max_tokens {
            self.max_tokens = v;
        }
        if let Some(v) = overrides.top_p {
            self.top_p = v;
        }
        if let Some(v) = overrides.frequency_penalty {
            self.frequency_penalty = v;
        }
        if let Some(v) = overrides.presence_penalty {
            self.presence_penalty = v;
        }
        self
    }

    /// Check every value against the engine's bounds.
    pub fn validate(&self, engine: &EngineParameters) -> Result<(), ChatError> {
        check("max_tokens", self.max_tokens, &engine.max_tokens)?;
        check("temperature", self.temperature, &engine.temperature)?;
        check("top_p", self.top_p, &engine.top_p)?;
        check("frequency_penalty", self.frequency_penalty, &engine.frequency_penalty)?;
        check("presence_penalty", self.presence_penalty, &engine.presence_penalty)?;
        Ok(())
    }
}

fn check<T>(name: &'static str, value: T, bounds: &ParamBounds<T>) -> Result<(), ChatError>
where
    T: PartialOrd + Copy + Into<f64>,
{
    if bounds.contains(value) {
        return Ok(());
    }
    Err(ChatError::InvalidParameter {
        name,
        value: value.into(),
        min: bounds.min.into(),
        max: bounds.max.into(),
    })
}

/// JSON body for `chat/completions`.
pub(crate) fn request_body(
    engine: &str,
    messages: &[Value],
    params: &SamplingParams,
    tools: &[Value],
    stream: bool,
) -> Value {
    let mut body = json!({
        "model": engine,
        "messages": messages,
        "temperature": params.temperature,
        "max_tokens": params.max_tokens,
        "top_p": params.top_p,
        "frequency_penalty": params.frequency_penalty,
        "presence_penalty": params.presence_penalty,
        "stop": params.stop,
        "stream": stream,
    });
    if !tools.is_empty() {
        body["tools"] = json!(tools);
        body["tool_choice"] = json!("auto");
    }
    body
}
