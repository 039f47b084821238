//! Interactive chat loop on stdin/stdout with slash commands.

use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::cli::Args;
use crate::core;
use crate::core::commands::{self, SlashCommand};
use crate::core::config::Config;
use crate::core::conversation::Conversation;
use crate::core::llm::{ChatRequest, SamplingParams, StreamStatus};
use crate::core::models::{self, EngineParameters};
use crate::core::tools::SearchOptions;
use crate::run;

/// Routes Ctrl-C to the reply in progress, if any.
#[derive(Default)]
struct Interrupts {
    current: Mutex<Option<CancellationToken>>,
}

impl Interrupts {
    /// Token for a new turn; Ctrl-C cancels it until `end`.
    fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.slot() = Some(token.clone());
        token
    }

    fn end(&self) {
        self.slot().take();
    }

    /// Cancel the running turn. False when no turn is running.
    fn interrupt(&self) -> bool {
        match self.slot().take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Session-wide Ctrl-C listener: cancels the current turn, or exits at the prompt.
fn listen_for_interrupts(interrupts: Arc<Interrupts>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if !interrupts.interrupt() {
                println!();
                std::process::exit(130);
            }
        }
    })
}

/// Read one line off the runtime; `None` at end of input.
async fn read_line() -> io::Result<Option<String>> {
    tokio::task::spawn_blocking(|| -> io::Result<Option<String>> {
        let mut line = String::new();
        let n = io::stdin().lock().read_line(&mut line)?;
        Ok((n > 0).then_some(line))
    })
    .await
    .map_err(io::Error::other)?
}

/// Mutable state of one interactive session.
struct Session<'a> {
    args: &'a Args,
    config: &'a Config,
    conversation: Conversation,
    engine: &'static EngineParameters,
    params: SamplingParams,
    tools: bool,
    interrupts: Arc<Interrupts>,
}

enum Flow {
    Continue,
    Quit,
}

impl<'a> Session<'a> {
    fn new(
        args: &'a Args,
        config: &'a Config,
        interrupts: Arc<Interrupts>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let engine = models::lookup(run::engine_id(args, config))?;
        let params = run::sampling_for(args, config, engine)?;
        let system = args.system.as_deref().unwrap_or(&config.system_message);
        Ok(Self {
            args,
            config,
            conversation: Conversation::with_system(system),
            engine,
            params,
            tools: args.tools,
            interrupts,
        })
    }

    async fn command(&mut self, command: SlashCommand) -> Flow {
        match command {
            SlashCommand::Help => {
                println!("{}", commands::help_text());
                println!("  Ctrl-C cancels a reply in progress, or exits at the prompt. Ctrl-D exits.");
            }
            SlashCommand::Clear => {
                self.conversation.clear();
                println!("Conversation cleared.");
            }
            SlashCommand::System(None) => {
                println!("{}", self.conversation.system().unwrap_or("(no system message)"));
            }
            SlashCommand::System(Some(text)) => {
                self.conversation.set_system(text);
                println!("System message updated.");
            }
            SlashCommand::Engine(None) => {
                println!("{} ({})", self.engine.engine_id, self.engine.description);
            }
            SlashCommand::Engine(Some(id)) => self.switch_engine(&id),
            SlashCommand::Params => self.print_params(),
            SlashCommand::Tokens => match run::usage_line(&self.conversation, self.engine) {
                Ok(line) => println!("{}", line),
                Err(e) => eprintln!("Error: {}", e),
            },
            SlashCommand::Search(query) => {
                if let Err(e) =
                    run::run_search(self.config.search.as_ref(), &query, SearchOptions::default(), true)
                        .await
                {
                    eprintln!("Error: {}", e);
                }
            }
            SlashCommand::Tools(None) => {
                println!("Web search tool is {}.", if self.tools { "on" } else { "off" });
            }
            SlashCommand::Tools(Some(on)) => {
                if on && self.config.search.is_none() {
                    eprintln!("Error: set BING_SUBSCRIPTION_KEY to enable web search.");
                } else {
                    self.tools = on;
                    println!("Web search tool {}.", if on { "enabled" } else { "disabled" });
                }
            }
            SlashCommand::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    fn switch_engine(&mut self, id: &str) {
        let result = models::lookup(id)
            .map_err(core::llm::ChatError::from)
            .and_then(|engine| Ok((engine, run::sampling_for(self.args, self.config, engine)?)));
        match result {
            Ok((engine, params)) => {
                self.engine = engine;
                self.params = params;
                println!("Engine set to {}.", engine.engine_id);
            }
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    fn print_params(&self) {
        let e = self.engine;
        let p = &self.params;
        println!("engine            {}", e.engine_id);
        println!("max_tokens        {} [{}, {}]", p.max_tokens, e.max_tokens.min, e.max_tokens.max);
        println!("temperature       {} [{}, {}]", p.temperature, e.temperature.min, e.temperature.max);
        println!("top_p             {} [{}, {}]", p.top_p, e.top_p.min, e.top_p.max);
        println!(
            "frequency_penalty {} [{}, {}]",
            p.frequency_penalty, e.frequency_penalty.min, e.frequency_penalty.max
        );
        println!(
            "presence_penalty  {} [{}, {}]",
            p.presence_penalty, e.presence_penalty.min, e.presence_penalty.max
        );
    }

    /// One user turn: send, print, then commit or abandon.
    async fn turn(&mut self, input: &str) {
        if let Err(e) = self.conversation.begin_turn(input) {
            eprintln!("Error: {}", e);
            return;
        }

        let cancel_token = self.interrupts.begin();
        let mut options = run::chat_options(self.args, !self.args.no_stream);
        options.tools = self.tools;
        options.cancel_token = Some(cancel_token);
        let result = core::llm::chat(ChatRequest {
            config: self.config,
            engine: &self.engine.engine_id,
            conversation: &self.conversation,
            params: &self.params,
            options,
        })
        .await;
        self.interrupts.end();

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.conversation.abandon_turn();
                eprintln!("Error: {}", e);
                return;
            }
        };

        if self.args.no_stream {
            print!("{}", outcome.content);
        }
        println!();
        if let Some(notice) = run::incomplete_notice(&outcome) {
            eprintln!("{}", notice);
        }

        let keep = match outcome.status {
            StreamStatus::Complete => true,
            StreamStatus::Interrupted { .. } => !outcome.content.is_empty(),
            StreamStatus::Cancelled => false,
        };
        if keep {
            if let Err(e) = self.conversation.commit_assistant(outcome.content) {
                eprintln!("Error: {}", e);
            }
        } else {
            self.conversation.abandon_turn();
        }

        match run::usage_line(&self.conversation, self.engine) {
            Ok(line) => log::info!("[{}] {}", self.conversation.id(), line),
            Err(e) => log::warn!("token count unavailable: {}", e),
        }
    }
}

/// Run the interactive loop until /quit or end of input.
pub async fn run(args: &Args, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let interrupts = Arc::new(Interrupts::default());
    let mut session = Session::new(args, config, Arc::clone(&interrupts))?;
    let listener = listen_for_interrupts(interrupts);
    println!(
        "{} {} on {}. Type /help for commands.",
        core::app::NAME,
        core::app::VERSION,
        session.engine.engine_id
    );

    let result = async {
        loop {
            print!("> ");
            io::stdout().flush()?;
            let Some(line) = read_line().await? else {
                println!();
                break;
            };
            let input = line.trim();
            if input.is_empty() {
                continue;
            }

            match commands::parse(input) {
                Some(Ok(command)) => {
                    if let Flow::Quit = session.command(command).await {
                        break;
                    }
                }
                Some(Err(e)) => eprintln!("{}", e),
                None => session.turn(input).await,
            }
        }
        Ok::<(), io::Error>(())
    }
    .await;
    listener.abort();
    Ok(result?)
}
