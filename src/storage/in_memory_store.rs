use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::kv::{BoxFuture, KeyValueStore, StorageResult};

/// In-memory key/value store.
/// Useful for testing and development.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<String>>> {
        let entries = self.entries.clone();
        let key = key.to_string();

        Box::pin(async move { Ok(entries.lock().get(&key).cloned()) })
    }

    fn put(&self, key: &str, value: String) -> BoxFuture<'static, StorageResult<()>> {
        let entries = self.entries.clone();
        let key = key.to_string();

        Box::pin(async move {
            entries.lock().insert(key, value);
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> BoxFuture<'static, StorageResult<()>> {
        let entries = self.entries.clone();
        let key = key.to_string();

        Box::pin(async move {
            entries.lock().remove(&key);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip() {
        let store = InMemoryStore::new();

        store.put("k", "\"v\"".to_string()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("\"v\""));

        store.remove("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
    }
}
