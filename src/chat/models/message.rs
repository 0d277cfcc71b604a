use serde::{Deserialize, Serialize};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    /// The role's wire name, matching its serde rename.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// A single message in a conversation transcript.
///
/// User messages are complete the moment they are created. Assistant
/// messages start empty and incomplete; their content grows in place as
/// stream events arrive and `is_complete` flips once the terminal event
/// has been observed. After that only the `saved` bookmark may change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub saved: bool,
    #[serde(default)]
    pub is_complete: bool,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            saved: false,
            is_complete: true,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            saved: false,
            is_complete: true,
        }
    }

    /// An empty assistant message awaiting streamed content.
    pub fn assistant_streaming() -> Self {
        Self {
            role: MessageRole::Assistant,
            content: String::new(),
            saved: false,
            is_complete: false,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            saved: false,
            is_complete: true,
        }
    }

    /// Toggle the user bookmark on this message.
    pub fn toggle_saved(&mut self) {
        self.saved = !self.saved;
    }
}
