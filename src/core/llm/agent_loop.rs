//! Agent loop: send the request, fold the response, run web search tool calls, repeat.

use async_openai::Client;
use async_openai::config::AzureConfig;
use serde_json::Value;

use crate::core::tools::WebSearchTool;

use super::request::{SamplingParams, request_body};
use super::stream::{StreamControl, StreamOutcome, StreamState, await_response, collect_stream};
use super::tool_execution;
use super::{ChatError, map_api_error};

/// Rounds of tool calls allowed before the model must answer in text.
pub(super) const MAX_TOOL_ROUNDS: usize = 4;

/// Core parameters for the agent loop (API, engine, sampling, messages).
pub(super) struct AgentLoopParams<'a> {
    pub client: &'a Client<AzureConfig>,
    pub engine: &'a str,
    pub sampling: &'a SamplingParams,
    pub search: Option<&'a WebSearchTool>,
    /// Request-local message list; tool exchanges are appended here only.
    pub messages: Vec<Value>,
    pub stream: bool,
}

/// Callbacks and options for the agent loop (progress, streaming, cancellation).
pub(super) struct AgentLoopCallbacks<'a> {
    pub on_progress: Option<&'a (dyn Fn(&str) + Send + Sync)>,
    pub control: StreamControl<'a>,
}

/// One completion call, streamed or not.
async fn complete_once(
    params: &AgentLoopParams<'_>,
    tools: &[Value],
    control: &StreamControl<'_>,
) -> Result<StreamOutcome, ChatError> {
    let body = request_body(
        params.engine,
        &params.messages,
        params.sampling,
        tools,
        params.stream,
    );
    let chat_api = params.client.chat();

    if params.stream {
        let stream = await_response(chat_api.create_stream_byot::<_, Value>(body), control)
            .await?
            .map_err(map_api_error)?;
        return collect_stream(stream, control).await;
    }

    let response: Value = await_response(chat_api.create_byot::<_, Value>(body), control)
        .await?
        .map_err(map_api_error)?;
    let state = StreamState::from_response(&response);
    if !state.text().is_empty()
        && let Some(cb) = control.on_content_chunk
    {
        cb(state.text());
    }
    Ok(state.finish())
}

/// Run the agent loop until the model answers without tool calls.
pub(super) async fn run_agent_loop(
    mut params: AgentLoopParams<'_>,
    callbacks: AgentLoopCallbacks<'_>,
) -> Result<StreamOutcome, ChatError> {
    let cancel_token = callbacks.control.cancel_token;
    let tool_defs: Vec<Value> = params.search.map(|t| vec![t.definition()]).unwrap_or_default();
    let mut round = 0;

    loop {
        if cancel_token.is_some_and(|t| t.is_cancelled()) {
            return Err(ChatError::Cancelled);
        }
        if let Some(progress) = callbacks.on_progress {
            progress("Calling API...");
        }

        // Last round goes out without tools so the model has to reply in text.
        let tools = if round < MAX_TOOL_ROUNDS { tool_defs.as_slice() } else { &[] };
        log::debug!(
            "request round {} to {} ({} messages, {} tools)",
            round,
            params.engine,
            params.messages.len(),
            tools.len()
        );
        let outcome = complete_once(&params, tools, &callbacks.control).await?;
        log::debug!("round {} ended after {} chunks: {:?}", round, outcome.chunks, outcome.status);

        let Some(search) = params.search else {
            return Ok(outcome);
        };
        if !outcome.is_complete() || outcome.tool_calls.is_empty() {
            return Ok(outcome);
        }

        params.messages.push(tool_execution::assistant_tool_message(
            &outcome.content,
            &outcome.tool_calls,
        ));
        for tool_call in &outcome.tool_calls {
            if cancel_token.is_some_and(|t| t.is_cancelled()) {
                return Err(ChatError::Cancelled);
            }
            let call = tool_execution::execute_tool_call(tool_call, search, callbacks.on_progress);
            let result = match await_response(call, &callbacks.control).await {
                Ok(message) => message,
                // A slow search fails the call, not the turn.
                Err(ChatError::Timeout(limit)) => {
                    log::warn!("{} timed out after {:?}", search.name(), limit);
                    tool_execution::tool_message(
                        tool_call["id"].as_str().unwrap_or_default(),
                        format!("Error: web search timed out after {}s", limit.as_secs_f64()),
                    )
                }
                Err(e) => return Err(e),
            };
            params.messages.push(result);
        }
        round += 1;
    }
}
