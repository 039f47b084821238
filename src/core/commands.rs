//! Slash commands for the interactive chat loop.

/// A parsed slash command.
#[derive(Clone, Debug, PartialEq)]
pub enum SlashCommand {
    Help,
    Clear,
    /// Show the system message, or replace it.
    System(Option<String>),
    /// Show the current engine, or switch to another.
    Engine(Option<String>),
    /// Show the current sampling parameters.
    Params,
    Tokens,
    Search(String),
    Tools(Option<bool>),
    Quit,
}

/// Built-in command definition, for help output.
#[derive(Clone, Copy, Debug)]
pub struct BuiltinCommand {
    pub name: &'static str,
    pub usage: &'static str,
    pub description: &'static str,
}

impl BuiltinCommand {
    /// Full command string including slash, e.g. "/clear".
    pub fn full_name(&self) -> String {
        format!("/{}", self.name)
    }
}

const BUILTIN_COMMANDS: &[BuiltinCommand] = &[
    BuiltinCommand { name: "help", usage: "", description: "Show this help" },
    BuiltinCommand { name: "clear", usage: "", description: "Start over, keeping the system message" },
    BuiltinCommand { name: "system", usage: "[text]", description: "Show or replace the system message" },
    BuiltinCommand { name: "engine", usage: "[id]", description: "Show or switch the engine" },
    BuiltinCommand { name: "params", usage: "", description: "Show sampling parameters and their bounds" },
    BuiltinCommand { name: "tokens", usage: "", description: "Count tokens used by the conversation" },
    BuiltinCommand { name: "search", usage: "<query>", description: "Run a Bing web search" },
    BuiltinCommand { name: "tools", usage: "[on|off]", description: "Let the model call web search" },
    BuiltinCommand { name: "quit", usage: "", description: "Exit (also /exit)" },
];

/// Returns all built-in slash commands.
pub fn builtin_commands() -> &'static [BuiltinCommand] {
    BUILTIN_COMMANDS
}

/// Help text listing every command with its usage.
pub fn help_text() -> String {
    builtin_commands()
        .iter()
        .map(|c| {
            let head = format!("{} {}", c.full_name(), c.usage);
            format!("  {:<18} {}", head.trim_end(), c.description)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Errors from parsing a slash command line.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Unknown command /{0}. Type /help for the list.")]
    Unknown(String),
    #[error("Usage: /{name} {usage}")]
    Usage { name: &'static str, usage: &'static str },
}

fn optional_arg(rest: &str) -> Option<String> {
    let rest = rest.trim();
    (!rest.is_empty()).then(|| rest.to_string())
}

/// Parse an input line. Returns `None` when the line is a chat message.
pub fn parse(line: &str) -> Option<Result<SlashCommand, CommandError>> {
    let body = line.trim_start().strip_prefix('/')?;
    let (name, rest) = body.split_once(char::is_whitespace).unwrap_or((body, ""));
    let command = match name.to_lowercase().as_str() {
        "help" | "?" => Ok(SlashCommand::Help),
        "clear" => Ok(SlashCommand::Clear),
        "system" => Ok(SlashCommand::System(optional_arg(rest))),
        "engine" => Ok(SlashCommand::Engine(optional_arg(rest))),
        "params" => Ok(SlashCommand::Params),
        "tokens" => Ok(SlashCommand::Tokens),
        "search" => optional_arg(rest).map(SlashCommand::Search).ok_or(CommandError::Usage {
            name: "search",
            usage: "<query>",
        }),
        "tools" => match rest.trim().to_lowercase().as_str() {
            "" => Ok(SlashCommand::Tools(None)),
            "on" => Ok(SlashCommand::Tools(Some(true))),
            "off" => Ok(SlashCommand::Tools(Some(false))),
            _ => Err(CommandError::Usage {
                name: "tools",
                usage: "[on|off]",
            }),
        },
        "quit" | "exit" => Ok(SlashCommand::Quit),
        other => Err(CommandError::Unknown(other.to_string())),
    };
    Some(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(parse("hello there"), None);
        assert_eq!(parse("what is 1/2?"), None);
    }

    #[test]
    fn commands_without_arguments() {
        assert_eq!(parse("/help"), Some(Ok(SlashCommand::Help)));
        assert_eq!(parse("  /CLEAR  "), Some(Ok(SlashCommand::Clear)));
        assert_eq!(parse("/exit"), Some(Ok(SlashCommand::Quit)));
        assert_eq!(parse("/engine"), Some(Ok(SlashCommand::Engine(None))));
    }

    #[test]
    fn arguments_keep_inner_spacing() {
        assert_eq!(
            parse("/system You are  a pirate."),
            Some(Ok(SlashCommand::System(Some("You are  a pirate.".to_string()))))
        );
        assert_eq!(
            parse("/search rust site:docs.rs"),
            Some(Ok(SlashCommand::Search("rust site:docs.rs".to_string())))
        );
    }

    #[test]
    fn search_needs_a_query() {
        assert_eq!(
            parse("/search   "),
            Some(Err(CommandError::Usage {
                name: "search",
                usage: "<query>"
            }))
        );
    }

    #[test]
    fn tools_switch() {
        assert_eq!(parse("/tools on"), Some(Ok(SlashCommand::Tools(Some(true)))));
        assert_eq!(parse("/tools OFF"), Some(Ok(SlashCommand::Tools(Some(false)))));
        assert_eq!(parse("/tools"), Some(Ok(SlashCommand::Tools(None))));
        assert!(matches!(parse("/tools maybe"), Some(Err(CommandError::Usage { .. }))));
    }

    #[test]
    fn unknown_command() {
        let err = parse("/frobnicate").unwrap().unwrap_err();
        assert_eq!(err.to_string(), "Unknown command /frobnicate. Type /help for the list.");
    }

    #[test]
    fn help_lists_every_command() {
        let help = help_text();
        for c in builtin_commands() {
            assert!(help.contains(&c.full_name()), "missing {}", c.name);
        }
    }
}
