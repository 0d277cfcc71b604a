pub mod debounce;
pub mod session_repository;

pub use debounce::{PendingSave, SaveDebouncer};
pub use session_repository::{SessionRepository, SessionUpdate, CHAT_HISTORY_KEY, DEFAULT_MAX_SESSIONS};
