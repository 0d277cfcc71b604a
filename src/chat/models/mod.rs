pub mod message;
pub mod session;
pub mod session_notifier;
pub mod source;

pub use message::{ChatMessage, MessageRole};
pub use session::ChatSession;
pub use session_notifier::{SessionNotifier, SessionSnapshot};
pub use source::SourceConfig;
