use std::path::PathBuf;

use super::kv::{BoxFuture, KeyValueStore, StorageError, StorageResult};

/// JSON file-backed key/value store.
/// Each key is stored as a separate file under ~/.config/codechat/
pub struct JsonFileStore {
    storage_dir: PathBuf,
}

impl JsonFileStore {
    /// Create a store rooted at the XDG-compliant config directory.
    pub fn new() -> StorageResult<Self> {
        let storage_dir = dirs::config_dir()
            .ok_or_else(|| StorageError::Initialization {
                message: "Could not determine config directory".to_string(),
            })?
            .join("codechat");

        Ok(Self { storage_dir })
    }

    /// Create a store rooted at a custom directory (for testing).
    pub fn with_dir(storage_dir: PathBuf) -> Self {
        Self { storage_dir }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.storage_dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<String>>> {
        let path = self.key_path(key);

        Box::pin(async move {
            if !path.exists() {
                return Ok(None);
            }

            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(StorageError::Io)?;

            Ok(Some(contents))
        })
    }

    fn put(&self, key: &str, value: String) -> BoxFuture<'static, StorageResult<()>> {
        let path = self.key_path(key);
        let storage_dir = self.storage_dir.clone();

        Box::pin(async move {
            tokio::fs::create_dir_all(&storage_dir)
                .await
                .map_err(StorageError::Io)?;

            // Write atomically using temp file + rename
            let temp_path = path.with_extension("json.tmp");
            tokio::fs::write(&temp_path, value)
                .await
                .map_err(StorageError::Io)?;

            tokio::fs::rename(&temp_path, &path)
                .await
                .map_err(StorageError::Io)?;

            Ok(())
        })
    }

    fn remove(&self, key: &str) -> BoxFuture<'static, StorageResult<()>> {
        let path = self.key_path(key);

        Box::pin(async move {
            if path.exists() {
                tokio::fs::remove_file(&path).await.map_err(StorageError::Io)?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonFileStore::with_dir(tmp.path().to_path_buf());

        store
            .put("chat_history", "[1,2,3]".to_string())
            .await
            .unwrap();

        let value = store.get("chat_history").await.unwrap();
        assert_eq!(value.as_deref(), Some("[1,2,3]"));
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonFileStore::with_dir(tmp.path().to_path_buf());

        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonFileStore::with_dir(tmp.path().to_path_buf());

        store.put("k", "\"a\"".to_string()).await.unwrap();
        store.put("k", "\"b\"".to_string()).await.unwrap();

        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("\"b\""));
    }

    #[tokio::test]
    async fn test_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonFileStore::with_dir(tmp.path().to_path_buf());

        store.put("k", "{}".to_string()).await.unwrap();
        store.remove("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());

        // Removing again is fine
        store.remove("k").await.unwrap();
    }
}
