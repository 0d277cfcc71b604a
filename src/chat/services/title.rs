use chrono::Local;

use crate::chat::models::{ChatMessage, MessageRole};

const TITLE_MAX_CHARS: usize = 100;

/// Derives a display title from a transcript.
///
/// Longer conversations (more than two user messages) are titled by the
/// latest user message, short ones by the latest assistant reply, and an
/// empty transcript falls back to a dated placeholder.
pub fn derive_title(messages: &[ChatMessage]) -> String {
    let user_count = messages
        .iter()
        .filter(|m| m.role == MessageRole::User)
        .count();

    let picked = if user_count > 2 {
        messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
    } else {
        messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
    };

    match picked {
        Some(message) => truncate_flattened(&message.content),
        None => format!("Chat {}", Local::now().format("%Y-%m-%d")),
    }
}

fn truncate_flattened(text: &str) -> String {
    let flattened = text.replace('\n', " ");
    let truncated: String = flattened.chars().take(TITLE_MAX_CHARS).collect();
    if flattened.chars().count() > TITLE_MAX_CHARS {
        format!("{truncated}...")
    } else {
        truncated
    }
}
