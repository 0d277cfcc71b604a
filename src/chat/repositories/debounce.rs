use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

use super::session_repository::{SessionRepository, SessionUpdate};
use crate::chat::models::{ChatMessage, SourceConfig};
use crate::settings::models::AssistantRole;
use crate::storage::StorageResult;

const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_secs(1);

/// Transcript state captured for a deferred save.
#[derive(Debug, Clone)]
pub struct PendingSave {
    pub messages: Vec<ChatMessage>,
    pub assistant_role: Option<AssistantRole>,
    pub sources: Option<Vec<SourceConfig>>,
}

/// Coalesces rapid transcript updates into one durable write.
///
/// Each schedule replaces the previous timer, so only the last state within
/// the quiescence window is persisted. The session id starts unresolved for
/// a fresh conversation; the first save that completes stores the id the
/// repository handed back, and every later save targets that session.
pub struct SaveDebouncer {
    repository: Arc<SessionRepository>,
    window: Duration,
    timer: Arc<Mutex<Option<JoinHandle<()>>>>,
    session_id: Arc<Mutex<Option<String>>>,
}

impl SaveDebouncer {
    pub fn new(repository: Arc<SessionRepository>) -> Self {
        Self::with_window(repository, DEFAULT_DEBOUNCE_WINDOW)
    }

    pub fn with_window(repository: Arc<SessionRepository>, window: Duration) -> Self {
        Self {
            repository,
            window,
            timer: Arc::new(Mutex::new(None)),
            session_id: Arc::new(Mutex::new(None)),
        }
    }

    /// The session this debouncer currently targets, once known.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().clone()
    }

    /// Retarget to an existing session, e.g. after loading one.
    pub fn set_session_id(&self, id: Option<String>) {
        *self.session_id.lock() = id;
    }

    /// Schedule a save after the quiescence window, replacing any pending one.
    pub fn schedule(&self, pending: PendingSave) {
        let repository = self.repository.clone();
        let session_id = self.session_id.clone();
        let window = self.window;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if let Err(err) = perform_save(&repository, &session_id, pending).await {
                warn!(error = %err, "debounced session save failed");
            }
        });

        if let Some(previous) = self.timer.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Cancel any pending save and write immediately.
    pub async fn flush(&self, pending: PendingSave) -> StorageResult<String> {
        self.cancel();
        perform_save(&self.repository, &self.session_id, pending).await
    }

    /// Drop any pending save without writing.
    pub fn cancel(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for SaveDebouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn perform_save(
    repository: &SessionRepository,
    session_id: &Mutex<Option<String>>,
    pending: PendingSave,
) -> StorageResult<String> {
    let target = session_id.lock().clone();
    let id = repository
        .save_session(SessionUpdate {
            messages: pending.messages,
            session_id: target,
            assistant_role: pending.assistant_role,
            bump_timestamp: true,
            sources: pending.sources,
        })
        .await?;
    *session_id.lock() = Some(id.clone());
    Ok(id)
}
