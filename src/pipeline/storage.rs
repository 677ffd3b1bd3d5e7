//! Key-value storage behind the execution state
//!
//! The host only offers string get/set/delete, so every piece of pipeline
//! state is stored as its own string key.

use async_trait::async_trait;
use eyre::{eyre, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex;
use tracing::debug;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-process store, used by tests and by ephemeral CLI runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: StdMutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: StdMutex::new(values.into_iter().map(|(k, v)| (k.into(), v.into())).collect()),
        }
    }

    /// Copy of every stored key
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.values.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().map_err(|_| eyre!("memory store poisoned"))?;
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().map_err(|_| eyre!("memory store poisoned"))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().map_err(|_| eyre!("memory store poisoned"))?;
        values.remove(key);
        Ok(())
    }
}

/// JSON object on disk. Writes go to a temp file that is renamed over
/// the existing file.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load_all(&self) -> Result<BTreeMap<String, String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| eyre!("Corrupt state file {}: {}", self.path.display(), e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_string_pretty(values)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("State written to {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.load_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut values = self.load_all().await?;
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut values = self.load_all().await?;
        if values.remove(key).is_some() {
            self.write_all(&values).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").await.unwrap(), None);

        store.set("a", "1").await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));

        store.delete("a").await.unwrap();
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_memory_store_prefilled() {
        let store = MemoryStore::with_values([("keeperLastRun", "1700000000")]);
        let value = tokio_test::block_on(store.get("keeperLastRun")).unwrap();
        assert_eq!(value.as_deref(), Some("1700000000"));
        assert_eq!(store.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_json_file_store_persists() {
        let path = std::env::temp_dir().join(format!("relay-keeper-store-{}.json", std::process::id()));
        let _ = tokio::fs::remove_file(&path).await;

        let store = JsonFileStore::new(&path);
        store.set("currStage", "claim").await.unwrap();
        store.set("offset", "300").await.unwrap();
        store.delete("offset").await.unwrap();

        let reopened = JsonFileStore::new(&path);
        assert_eq!(reopened.get("currStage").await.unwrap().as_deref(), Some("claim"));
        assert_eq!(reopened.get("offset").await.unwrap(), None);

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
