use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::ChatMessage;
use super::source::SourceConfig;
use crate::settings::models::AssistantRole;

/// A persisted, titled conversation plus the configuration snapshot that
/// was active when it was last saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    /// Creation time in Unix milliseconds. Immutable.
    pub timestamp: i64,
    /// Last mutation time in Unix milliseconds. Monotonically non-decreasing;
    /// not bumped when a proposed update turns out to be identical.
    pub last_updated: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_role: Option<AssistantRole>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceConfig>,
}

impl ChatSession {
    /// Generate a fresh session id: `session_<millis>_<random suffix>`.
    pub fn generate_id(now_ms: i64) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("session_{}_{}", now_ms, &suffix[..9])
    }
}
