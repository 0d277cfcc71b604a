use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::chat::models::{ChatMessage, ChatSession, SessionNotifier, SourceConfig};
use crate::chat::services::title::derive_title;
use crate::settings::models::AssistantRole;
use crate::storage::{KeyValueStore, StorageResult};

/// Storage key holding the whole session collection.
pub const CHAT_HISTORY_KEY: &str = "chat_history";

/// How many sessions are retained before the oldest is evicted.
pub const DEFAULT_MAX_SESSIONS: usize = 10;

/// A proposed save of the live transcript into the collection.
#[derive(Debug, Clone)]
pub struct SessionUpdate {
    pub messages: Vec<ChatMessage>,
    /// `None` creates a new session; `Some` targets an existing one.
    pub session_id: Option<String>,
    pub assistant_role: Option<AssistantRole>,
    pub bump_timestamp: bool,
    pub sources: Option<Vec<SourceConfig>>,
}

/// Owns the authoritative session collection.
///
/// All writes funnel through here: save-with-change-detection, rename,
/// delete, clear. Every mutation persists the full collection and then
/// broadcasts it on the notifier, so observers never read the store
/// directly.
pub struct SessionRepository {
    store: Arc<dyn KeyValueStore>,
    notifier: SessionNotifier,
    max_sessions: usize,
}

impl SessionRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_capacity(store, DEFAULT_MAX_SESSIONS)
    }

    pub fn with_capacity(store: Arc<dyn KeyValueStore>, max_sessions: usize) -> Self {
        Self {
            store,
            notifier: SessionNotifier::new(),
            max_sessions,
        }
    }

    pub fn notifier(&self) -> &SessionNotifier {
        &self.notifier
    }

    /// Save a transcript, creating or updating a session. Returns the id of
    /// the session that now holds the transcript.
    ///
    /// An update that changes nothing semantically (same messages, role,
    /// sources, and derived title) is dropped without a write, a
    /// `last_updated` bump, or a notification.
    pub async fn save_session(&self, update: SessionUpdate) -> StorageResult<String> {
        let mut sessions = self.load_collection().await?;
        let now = Utc::now().timestamp_millis();
        let title = derive_title(&update.messages);

        let existing = update
            .session_id
            .as_deref()
            .and_then(|id| sessions.iter().position(|s| s.id == id));

        let id = match existing {
            Some(index) => {
                let session = &mut sessions[index];
                let role = update.assistant_role.or(session.assistant_role);
                let sources = update.sources.clone().unwrap_or_else(|| session.sources.clone());
                let changed = session.messages != update.messages
                    || session.assistant_role != role
                    || session.sources != sources
                    || session.title != title;
                if !changed {
                    debug!(session_id = %session.id, "skipping save, session unchanged");
                    return Ok(session.id.clone());
                }

                session.messages = update.messages;
                session.assistant_role = role;
                session.sources = sources;
                session.title = title;
                if update.bump_timestamp {
                    // Strictly advances even within one millisecond.
                    session.last_updated = now.max(session.last_updated + 1);
                }
                session.id.clone()
            }
            None => {
                let id = ChatSession::generate_id(now);
                let session = ChatSession {
                    id: id.clone(),
                    title,
                    messages: update.messages,
                    timestamp: now,
                    last_updated: now,
                    assistant_role: update.assistant_role,
                    sources: update.sources.unwrap_or_default(),
                };
                sessions.insert(0, session);
                while sessions.len() > self.max_sessions {
                    self.evict_oldest(&mut sessions);
                }
                id
            }
        };

        self.persist_collection(sessions).await?;
        Ok(id)
    }

    pub async fn get_session(&self, id: &str) -> StorageResult<Option<ChatSession>> {
        let sessions = self.load_collection().await?;
        Ok(sessions.into_iter().find(|s| s.id == id))
    }

    /// All sessions, most recently updated first.
    pub async fn get_all_sessions(&self) -> StorageResult<Vec<ChatSession>> {
        let mut sessions = self.load_collection().await?;
        sessions.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        Ok(sessions)
    }

    pub async fn delete_session(&self, id: &str) -> StorageResult<()> {
        let mut sessions = self.load_collection().await?;
        let before = sessions.len();
        sessions.retain(|s| s.id != id);
        if sessions.len() == before {
            return Ok(());
        }
        self.persist_collection(sessions).await
    }

    /// Explicit rename. Always bumps `last_updated`; an explicit rename is a
    /// user action even when the text happens to match.
    pub async fn update_session_title(&self, id: &str, title: &str) -> StorageResult<()> {
        let mut sessions = self.load_collection().await?;
        let now = Utc::now().timestamp_millis();
        let Some(session) = sessions.iter_mut().find(|s| s.id == id) else {
            warn!(session_id = id, "rename target not found");
            return Ok(());
        };
        session.title = title.to_string();
        session.last_updated = now.max(session.last_updated + 1);
        self.persist_collection(sessions).await
    }

    pub async fn clear_all_sessions(&self) -> StorageResult<()> {
        self.store.remove(CHAT_HISTORY_KEY).await?;
        self.notifier.broadcast(Vec::new());
        Ok(())
    }

    /// Reload from the store and rebroadcast. For picking up writes made by
    /// another process sharing the same store.
    pub async fn refresh(&self) -> StorageResult<()> {
        let sessions = self.load_collection().await?;
        self.notifier.broadcast(sessions);
        Ok(())
    }

    fn evict_oldest(&self, sessions: &mut Vec<ChatSession>) {
        // Last index among minima, so ties evict deterministically.
        let mut oldest = 0;
        for (index, session) in sessions.iter().enumerate() {
            if session.last_updated <= sessions[oldest].last_updated {
                oldest = index;
            }
        }
        let evicted = sessions.remove(oldest);
        debug!(session_id = %evicted.id, "evicting session over retention cap");
    }

    async fn load_collection(&self) -> StorageResult<Vec<ChatSession>> {
        let Some(raw) = self.store.get(CHAT_HISTORY_KEY).await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(sessions) => Ok(sessions),
            Err(err) => {
                warn!(error = %err, "session collection unreadable, starting empty");
                Ok(Vec::new())
            }
        }
    }

    async fn persist_collection(&self, sessions: Vec<ChatSession>) -> StorageResult<()> {
        let raw = serde_json::to_string(&sessions)?;
        self.store.put(CHAT_HISTORY_KEY, raw).await?;
        self.notifier.broadcast(sessions);
        Ok(())
    }
}
