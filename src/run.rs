//! Application run modes: logger init, single prompt, subcommands.

use std::io::{self, Write};

use crate::cli::Args;
use crate::core;
use crate::core::config::{Config, SearchConfig};
use crate::core::conversation::{Conversation, Message};
use crate::core::llm::{ChatError, ChatOptions, ChatRequest, SamplingParams, StreamOutcome, StreamStatus};
use crate::core::models::{self, EngineParameters};
use crate::core::tools::{SearchOptions, WebSearchTool, web_search};

/// Initialize env_logger on stderr so replies on stdout stay clean.
pub fn init_logger(args: &Args) {
    let log_level = args.log_level();
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .target(env_logger::Target::Stderr)
        .try_init();
}

/// Engine for this run: `--engine`, else the configured one.
pub fn engine_id<'a>(args: &'a Args, config: &'a Config) -> &'a str {
    args.engine.as_deref().unwrap_or(&config.engine)
}

/// Sampling parameters for `engine`: its defaults, then ST_* values, then CLI flags.
pub fn sampling_for(
    args: &Args,
    config: &Config,
    engine: &EngineParameters,
) -> Result<SamplingParams, ChatError> {
    let params = SamplingParams::defaults_for(engine).with_overrides(&args.sampling.apply(&config.sampling));
    params.validate(engine)?;
    Ok(params)
}

/// Chat options shared by the prompt and chat modes.
pub fn chat_options(args: &Args, stream_to_stdout: bool) -> ChatOptions {
    ChatOptions {
        on_progress: Some(Box::new(|s| log::info!("{}", s))),
        on_content_chunk: stream_to_stdout.then(|| -> core::llm::OnContentChunk {
            Box::new(|s| {
                let _ = io::stdout().write_all(s.as_bytes());
                let _ = io::stdout().flush();
            })
        }),
        stream: !args.no_stream,
        tools: args.tools,
        timeout: args.timeout.map(std::time::Duration::from_secs),
        ..Default::default()
    }
}

/// Notice printed after a reply that did not complete.
pub fn incomplete_notice(outcome: &StreamOutcome) -> Option<String> {
    match &outcome.status {
        StreamStatus::Complete => None,
        StreamStatus::Interrupted { reason } => Some(format!("[response interrupted: {}]", reason)),
        StreamStatus::Cancelled => Some("[response cancelled]".to_string()),
    }
}

/// Token usage summary for a conversation against the engine's context window.
pub fn usage_line(conversation: &Conversation, engine: &EngineParameters) -> Result<String, ChatError> {
    let window = engine.context_window as usize;
    let model = &engine.tokenizer_model;
    let used = core::tokens::count_message_tokens(conversation.messages(), model)?;
    let remaining = core::tokens::remaining_context(conversation.messages(), model, window)?;
    Ok(format!(
        "{} tokens used ({}), {} of {} remaining",
        used, model, remaining, window
    ))
}

/// Run single prompt mode: chat with the engine, print the response to stdout.
pub async fn run_single_prompt(
    args: &Args,
    config: &Config,
    prompt_arg: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let prompt = if prompt_arg == "-" {
        io::read_to_string(io::stdin())?
    } else {
        prompt_arg.to_string()
    };
    let prompt = prompt.trim();
    if prompt.is_empty() {
        eprintln!("Error: empty prompt");
        std::process::exit(1);
    }

    let engine = models::lookup(engine_id(args, config))?;
    let params = sampling_for(args, config, engine)?;
    let system = args.system.as_deref().unwrap_or(&config.system_message);
    let mut conversation = Conversation::with_system(system);
    conversation.begin_turn(prompt)?;

    let outcome = core::llm::chat(ChatRequest {
        config,
        engine: &engine.engine_id,
        conversation: &conversation,
        params: &params,
        options: chat_options(args, !args.no_stream),
    })
    .await?;

    if args.no_stream {
        print!("{}", outcome.content);
    }
    println!();
    if let Some(notice) = incomplete_notice(&outcome) {
        eprintln!("{}", notice);
    }
    if outcome.is_complete() || !outcome.content.is_empty() {
        conversation.commit_assistant(&outcome.content)?;
    } else {
        conversation.abandon_turn();
    }
    if args.verbose > 0 {
        eprintln!("{}", usage_line(&conversation, engine)?);
    }
    if !outcome.is_complete() {
        std::process::exit(1);
    }
    Ok(())
}

/// Print the engine table with parameter bounds.
pub fn print_engines() {
    let registry = models::builtin();
    println!(
        "{:<20} {:<24} {:>8} {:>13} {:>10} {:>10} {:>10}",
        "ENGINE", "TOKENIZER MODEL", "CONTEXT", "MAX TOKENS", "TEMP", "TOP_P", "PENALTIES"
    );
    for e in registry.iter() {
        println!(
            "{:<20} {:<24} {:>8} {:>13} {:>10} {:>10} {:>10}",
            e.engine_id,
            e.tokenizer_model,
            e.context_window,
            format!("{}-{}", e.max_tokens.min, e.max_tokens.max),
            format!("{}-{}", e.temperature.min, e.temperature.max),
            format!("{}-{}", e.top_p.min, e.top_p.max),
            format!("{}-{}", e.presence_penalty.min, e.presence_penalty.max),
        );
    }
}

/// Print the token count of `messages` (user role) under the engine's tokenizer model.
pub fn print_token_count(
    engine_id: &str,
    system: Option<&str>,
    messages: &[String],
) -> Result<(), ChatError> {
    let tokenizer_model = models::tokenizer_model(engine_id)?;
    let mut list: Vec<Message> = Vec::with_capacity(messages.len() + 1);
    if let Some(system) = system {
        list.push(Message::system(system));
    }
    list.extend(messages.iter().map(Message::user));
    let count = core::tokens::count_message_tokens(&list, tokenizer_model)?;
    println!("{} ({}, {} messages)", count, tokenizer_model, list.len());
    Ok(())
}

/// Run a web search and print the results table.
pub async fn run_search(
    config: Option<&SearchConfig>,
    query: &str,
    options: SearchOptions,
    markdown: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let tool = WebSearchTool::from_config(config)?;
    let results = tool.search(query, &options).await?;
    if markdown {
        println!("{}", web_search::render_markdown(&results));
    } else {
        println!("{}", web_search::render_html(&results));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::collections::HashMap;

    fn config(extra: &[(&str, &str)]) -> Config {
        let mut vars: HashMap<String, String> = HashMap::from([
            ("APIM_KEY".to_string(), "k".to_string()),
            ("APIM_ENDPOINT".to_string(), "https://gw".to_string()),
        ]);
        vars.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        core::config::load_from(|k| vars.get(k).cloned()).unwrap()
    }

    #[test]
    fn sampling_layers_env_then_flags() {
        let config = config(&[("ST_TEMPERATURE", "0.2"), ("ST_TOP_P", "0.5")]);
        let args = Args::parse_from(["apim-chat", "--top-p", "0.7"]);
        let engine = models::lookup(engine_id(&args, &config)).unwrap();
        let params = sampling_for(&args, &config, engine).unwrap();
        assert_eq!(engine.engine_id, "gpt-35-turbo-16k");
        assert_eq!(params.temperature, 0.2);
        assert_eq!(params.top_p, 0.7);
        assert_eq!(params.max_tokens, 800);
    }

    #[test]
    fn sampling_out_of_bounds_is_rejected() {
        let config = config(&[("ST_MAX_TOKENS", "9000")]);
        let args = Args::parse_from(["apim-chat", "--engine", "gpt-4"]);
        let engine = models::lookup(engine_id(&args, &config)).unwrap();
        assert!(matches!(
            sampling_for(&args, &config, engine),
            Err(ChatError::InvalidParameter { name: "max_tokens", .. })
        ));
    }

    #[test]
    fn notice_only_for_incomplete_replies() {
        let mut state = core::llm::StreamState::new();
        state.push_delta(Some("partial"));
        let outcome = state.interrupt("connection reset");
        assert_eq!(
            incomplete_notice(&outcome).as_deref(),
            Some("[response interrupted: connection reset]")
        );
        assert_eq!(incomplete_notice(&core::llm::StreamState::new().finish()), None);
    }

    #[test]
    fn usage_line_reports_remaining_window() {
        let engine = models::lookup("gpt-4").unwrap();
        let conv = Conversation::with_system("hello");
        let line = usage_line(&conv, engine).unwrap();
        assert!(line.contains("gpt-4-0613"));
        assert!(line.ends_with("of 8192 remaining"));
    }

    #[test]
    fn usage_line_uses_context_window_not_reply_limit() {
        let engine = models::lookup("gpt-4-turbo").unwrap();
        let line = usage_line(&Conversation::with_system("hello"), engine).unwrap();
        assert!(line.ends_with("of 128000 remaining"), "{}", line);
    }

    #[test]
    fn token_count_rejects_unknown_engine() {
        let err = print_token_count("gpt-5", None, &["hi".to_string()]).unwrap_err();
        assert!(err.to_string().contains("gpt-5"));
    }
}
