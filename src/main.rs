//! # apim-chat
//!
//! Chat client for Azure OpenAI deployments behind an API Management gateway.
//!
//! ## Features
//! - Single prompt mode with `-p` or `--prompt`
//! - Interactive chat loop with slash commands
//! - Engine registry with parameter bounds, token accounting, Bing web search

mod cli;
mod core;
mod repl;
mod run;

use clap::{CommandFactory, Parser};
use dotenv::dotenv;

use crate::cli::{Args, Commands};
use crate::core::tools::SearchOptions;

#[tokio::main]
async fn main() {
    dotenv().ok();
    let args = Args::parse();
    run::init_logger(&args);

    if let Err(e) = dispatch(&args).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn dispatch(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    match &args.command {
        Some(Commands::Engines) => {
            run::print_engines();
            return Ok(());
        }
        Some(Commands::Tokens { messages }) => {
            let engine = args.engine.clone().unwrap_or_else(core::config::engine);
            run::print_token_count(&engine, args.system.as_deref(), messages)?;
            return Ok(());
        }
        Some(Commands::Search {
            query,
            count,
            market,
            freshness,
            markdown,
        }) => {
            let defaults = SearchOptions::default();
            let options = SearchOptions {
                count: count.or(defaults.count),
                market: market.clone().or(defaults.market.clone()),
                freshness: freshness.clone(),
                ..defaults
            };
            let search = core::config::search();
            return run::run_search(search.as_ref(), query, options, *markdown).await;
        }
        Some(Commands::Completions { shell }) => {
            let mut cmd = Args::command();
            cli::generate(*shell, &mut cmd, core::app::NAME, &mut std::io::stdout());
            return Ok(());
        }
        None => {}
    }

    // Gateway credentials are only needed from here on.
    let config = core::config::load()?;

    match &args.prompt {
        Some(prompt) => run::run_single_prompt(args, &config, prompt).await,
        None => repl::run(args, &config).await,
    }
}
