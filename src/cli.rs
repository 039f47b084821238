//! CLI definitions: argument parsing, subcommands, and help text.

use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand};
use clap_complete::Shell;

pub use clap_complete::generate;

use crate::core::config::SamplingOverrides;

const AFTER_HELP: &str = "\
EXAMPLES:
  apim-chat                          Start an interactive chat
  apim-chat -p \"explain X\"           Single prompt, stream response to stdout
  apim-chat -p - --no-stream         Read prompt from stdin, print the full reply
  apim-chat --engine gpt-4 --tools   Chat with gpt-4, allowing web search
  apim-chat engines                  List engines and parameter bounds
  apim-chat tokens \"hello\" \"world\"   Count tokens for two user messages
  apim-chat search \"rust 2024\"       Run a Bing web search
  apim-chat completions bash         Generate bash completions

ENVIRONMENT:
  APIM_ENDPOINT, APIM_KEY (required), AOAI_API_VERSION, ST_ENGINE, ST_TEMPERATURE,
  ST_MAX_TOKENS, ST_TOP_P, ST_FREQUENCY_PENALTY, ST_PRESENCE_PENALTY, SYSTEM,
  BING_SUBSCRIPTION_KEY, BING_SEARCH_URL, REQUEST_TIMEOUT_SECS. Read from .env when present.
";

/// Command-line arguments for the application.
#[derive(Parser)]
#[command(
    author,
    version,
    about = "Chat with Azure OpenAI deployments through an API Management gateway",
    after_help = AFTER_HELP
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Send a single prompt then exit (without starting the chat loop)
    #[arg(
        short = 'p',
        long,
        help = "Provide a prompt to get an immediate AI response (use '-' to read from stdin)"
    )]
    pub prompt: Option<String>,

    /// Engine (Azure deployment) to use
    #[arg(short = 'e', long, global = true, help = "Engine id (e.g. gpt-35-turbo-16k)")]
    pub engine: Option<String>,

    /// System message for the conversation
    #[arg(short = 's', long, global = true)]
    pub system: Option<String>,

    #[command(flatten)]
    pub sampling: SamplingArgs,

    /// Disable streaming (wait for full response before printing)
    #[arg(long, help = "Wait for the full response instead of streaming")]
    pub no_stream: bool,

    /// Let the model call the Bing web search tool
    #[arg(long)]
    pub tools: bool,

    /// Seconds to wait for the response and for each streamed chunk
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Increase log verbosity (use multiple times for debug)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Reduce log output (errors only)
    #[arg(short = 'q', long = "quiet", global = true)]
    pub quiet: bool,
}

/// Sampling flags; each one overrides the matching ST_* variable.
#[derive(ClapArgs, Debug, Default)]
pub struct SamplingArgs {
    #[arg(long)]
    pub temperature: Option<f64>,
    #[arg(long)]
    pub max_tokens: Option<u32>,
    #[arg(long)]
    pub top_p: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    pub frequency_penalty: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    pub presence_penalty: Option<f64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List engines with their tokenizer model and parameter bounds
    Engines,
    /// Count the tokens of user messages under an engine's tokenizer model
    Tokens {
        /// Message contents (each one a user message)
        #[arg(required = true)]
        messages: Vec<String>,
    },
    /// Run a Bing web search and print the results table
    Search {
        query: String,
        /// Number of results (max 50)
        #[arg(long)]
        count: Option<u32>,
        /// Market, e.g. en-US
        #[arg(long)]
        market: Option<String>,
        /// Day, Week, Month, or a date range
        #[arg(long)]
        freshness: Option<String>,
        /// Print a Markdown table instead of HTML
        #[arg(long)]
        markdown: bool,
    },
    /// Generate shell completion script
    Completions {
        /// Shell to generate completions for (bash, zsh, fish, powershell, elvish)
        #[arg(value_parser = clap::value_parser!(Shell))]
        shell: Shell,
    },
}

impl SamplingArgs {
    /// Layer these flags over environment overrides.
    pub fn apply(&self, base: &SamplingOverrides) -> SamplingOverrides {
        SamplingOverrides {
            temperature: self.temperature.or(base.temperature),
            max_tokens: self.max_tokens.or(base.max_tokens),
            top_p: self.top_p.or(base.top_p),
            frequency_penalty: self.frequency_penalty.or(base.frequency_penalty),
            presence_penalty: self.presence_penalty.or(base.presence_penalty),
        }
    }
}

impl Args {
    /// Log level based on -v/-q flags: error, warn, info, or debug.
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else if self.verbose >= 2 {
            "debug"
        } else if self.verbose >= 1 {
            "info"
        } else {
            "warn"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_follows_flags() {
        let args = Args::parse_from(["apim-chat", "-vv"]);
        assert_eq!(args.log_level(), "debug");
        let args = Args::parse_from(["apim-chat", "-q", "-v"]);
        assert_eq!(args.log_level(), "error");
        assert_eq!(Args::parse_from(["apim-chat"]).log_level(), "warn");
    }

    #[test]
    fn flags_override_environment_values() {
        let args = Args::parse_from([
            "apim-chat",
            "--temperature",
            "0.1",
            "--presence-penalty",
            "-1.5",
        ]);
        let merged = args.sampling.apply(&SamplingOverrides {
            temperature: Some(0.7),
            max_tokens: Some(1000),
            ..Default::default()
        });
        assert_eq!(merged.temperature, Some(0.1));
        assert_eq!(merged.max_tokens, Some(1000));
        assert_eq!(merged.presence_penalty, Some(-1.5));
        assert_eq!(merged.top_p, None);
    }

    #[test]
    fn engine_flag_is_global() {
        let args = Args::parse_from(["apim-chat", "tokens", "--engine", "gpt-4", "hi"]);
        assert_eq!(args.engine.as_deref(), Some("gpt-4"));
        assert!(matches!(args.command, Some(Commands::Tokens { ref messages }) if messages == &["hi"]));
    }
}
