//! Slash commands for interactive mode

use arplexity_chat::ConversationController;

use crate::render::summarize;

/// Result of executing a slash command
#[derive(Debug, PartialEq, Eq)]
pub enum CommandResult {
    /// Start a new conversation (drops the checkpoint)
    Clear,
    /// Show a message to the user (not sent to the server)
    Message(String),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse and execute a slash command
pub fn execute_command(input: &str, controller: &ConversationController) -> Option<CommandResult> {
    let input = input.trim();
    let command = input.strip_prefix('/')?;
    let command = command
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_lowercase();

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "clear" | "c" => CommandResult::Clear,

        "quit" | "exit" | "q" => CommandResult::Exit,

        "history" => CommandResult::Message(
            controller
                .store()
                .iter()
                .map(summarize)
                .collect::<Vec<_>>()
                .join("\n"),
        ),

        "checkpoint" => CommandResult::Message(match controller.checkpoint() {
            Some(checkpoint) => format!("Checkpoint: {}", checkpoint),
            None => "No checkpoint yet".to_string(),
        }),

        _ => CommandResult::Unknown(command),
    })
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?        Show this help message
  /history             List messages in this conversation
  /checkpoint          Show the conversation checkpoint
  /clear, /c           Start a new conversation
  /quit, /exit, /q     Exit arplexity"#
        .to_string()
}
