use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("storage initialization failed: {message}")]
    Initialization { message: String },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Durable key/value storage for JSON-encoded values.
///
/// Keys are flat strings; values are the raw JSON text of whatever the
/// caller serialized. The session repository and the settings repository
/// use disjoint key namespaces and never contend on a key.
pub trait KeyValueStore: Send + Sync + 'static {
    /// Read the raw value for a key, `None` if the key was never written.
    fn get(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<String>>>;

    /// Durably write the value for a key, replacing any previous value.
    fn put(&self, key: &str, value: String) -> BoxFuture<'static, StorageResult<()>>;

    /// Remove a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> BoxFuture<'static, StorageResult<()>>;
}
