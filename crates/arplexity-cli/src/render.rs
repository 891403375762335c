//! Plain-text rendering of conversation events

use std::collections::HashMap;
use std::io::{self, Write};

use arplexity_chat::ConversationEvent;
use arplexity_wire::{Message, MessageId, SearchInfo, Stage};

use crate::utils::truncate_chars;

/// Longest source URL printed before truncation
const SOURCE_DISPLAY_CHARS: usize = 30;

#[derive(Debug, Default)]
struct Printed {
    content: String,
    stages: usize,
    sources: usize,
}

/// Prints streamed replies incrementally.
///
/// Tracks what was already written for each reply so only new text,
/// new stages and new sources are printed.
#[derive(Debug, Default)]
pub struct Renderer {
    printed: HashMap<MessageId, Printed>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render one event. Returns `true` when a session ended.
    pub fn render(&mut self, event: &ConversationEvent, out: &mut impl Write) -> io::Result<bool> {
        match event {
            ConversationEvent::MessageAppended { message } if message.is_user() => {}
            ConversationEvent::MessageAppended { message } => {
                self.printed.insert(message.id, Printed::default());
            }
            ConversationEvent::MessageUpdated { message } if !message.is_user() => {
                self.render_reply(message, out)?;
            }
            ConversationEvent::SessionEnded { message_id, .. } => {
                self.printed.remove(message_id);
                writeln!(out)?;
                writeln!(out)?;
                out.flush()?;
                return Ok(true);
            }
            _ => {}
        }
        out.flush()?;
        Ok(false)
    }

    fn render_reply(&mut self, message: &Message, out: &mut impl Write) -> io::Result<()> {
        let printed = self.printed.entry(message.id).or_default();

        if let Some(ref info) = message.search_info {
            render_search(info, printed, out)?;
        }

        if let Some(delta) = message.content.strip_prefix(printed.content.as_str()) {
            write!(out, "{}", delta)?;
        } else {
            // replaced rather than extended (transport failure text)
            writeln!(out)?;
            write!(out, "{}", message.content)?;
        }
        printed.content = message.content.clone();
        Ok(())
    }
}

fn render_search(info: &SearchInfo, printed: &mut Printed, out: &mut impl Write) -> io::Result<()> {
    for stage in info.stages.iter().skip(printed.stages) {
        match stage {
            Stage::Searching => writeln!(out, "[{}: {}]", stage.label(), info.query)?,
            Stage::Error => writeln!(
                out,
                "[{}: {}]",
                stage.label(),
                info.error_message().unwrap_or_default()
            )?,
            _ => writeln!(out, "[{}]", stage.label())?,
        }
    }
    printed.stages = info.stages.len();

    for url in info.sources.iter().skip(printed.sources) {
        writeln!(out, "  - {}", truncate_chars(url, SOURCE_DISPLAY_CHARS))?;
    }
    printed.sources = info.sources.len();
    Ok(())
}

/// One-line summary of a message for history listings
pub fn summarize(message: &Message) -> String {
    let who = if message.is_user() { "you" } else { "arplexity" };
    let mut line = format!(
        "#{} {}: {}",
        message.id,
        who,
        truncate_chars(&message.content, 60)
    );
    if let Some(stage) = message
        .search_info
        .as_ref()
        .and_then(|info| info.current_stage())
    {
        line.push_str(&format!(" ({})", stage.label()));
    }
    line
}
