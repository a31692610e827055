//! Slash commands for interactive mode

mod context;
mod history;

pub use context::ContextCommand;
pub use history::HistoryCommand;

/// Result of parsing a slash command
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Start a fresh thread
    NewThread,
    /// Print the current thread's messages
    ShowHistory,
    /// Print the fragments retrieved for the last turn
    ShowContext,
    /// Show a message to the user (not sent to the pipeline)
    Message(String),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse a slash command. Returns `None` for ordinary input.
pub fn execute_command(input: &str) -> Option<CommandResult> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let command = rest.split_whitespace().next().unwrap_or("").to_lowercase();

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "new" | "n" => CommandResult::NewThread,

        "history" => CommandResult::ShowHistory,

        "context" | "ctx" => CommandResult::ShowContext,

        "quit" | "exit" | "q" => CommandResult::Exit,

        _ => CommandResult::Unknown(command),
    })
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?        Show this help message
  /new, /n             Start a new conversation thread
  /history             Show messages in the current thread
  /context, /ctx       Show fragments retrieved for the last turn
  /quit, /exit, /q     Exit lore

Typing quit, exit or q on its own also exits."#
        .to_string()
}
