use chrono::Utc;
use tokio::sync::watch;

use super::session::ChatSession;

/// The full current session collection plus a monotonic change tick.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub sessions: Vec<ChatSession>,
    pub last_updated: i64,
}

/// Single-writer broadcast of "sessions changed" signals.
///
/// Every broadcast carries the complete current collection, not a diff.
/// Observers subscribe for a `watch::Receiver` and always see the latest
/// snapshot; the `last_updated` tick is strictly monotonic so a subscriber
/// can cheaply detect that anything changed.
pub struct SessionNotifier {
    tx: watch::Sender<SessionSnapshot>,
}

impl SessionNotifier {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot::default());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    /// Replace the broadcast collection and advance the tick.
    pub fn broadcast(&self, sessions: Vec<ChatSession>) {
        let now = Utc::now().timestamp_millis();
        self.tx.send_modify(|snapshot| {
            snapshot.last_updated = now.max(snapshot.last_updated + 1);
            snapshot.sessions = sessions;
        });
    }

    /// The most recently broadcast snapshot.
    pub fn current(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }
}

impl Default for SessionNotifier {
    fn default() -> Self {
        Self::new()
    }
}
