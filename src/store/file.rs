//! JSON-file store.
//!
//! The whole map is rewritten on every mutation; the file is small (a few
//! tokens and the working-URL list).

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::store::{StoreResult, TokenStore};

/// Store persisted as a flat JSON object on disk.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    inner: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store, loading existing contents if the file exists.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let map = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => {
                let map: BTreeMap<String, String> = serde_json::from_slice(&bytes)?;
                tracing::debug!(path = %path.display(), keys = map.len(), "Loaded store file");
                map
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            inner: Mutex::new(map),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn save(&self, map: &BTreeMap<String, String>) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(map)?;
        // Atomic replace.
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl TokenStore for FileStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.inner.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut map = self.inner.lock().await;
        map.insert(key.to_string(), value.to_string());
        self.save(&map).await
    }

    async fn set_many(&self, entries: &[(&str, String)]) -> StoreResult<()> {
        let mut map = self.inner.lock().await;
        for (key, value) in entries {
            map.insert((*key).to_string(), value.clone());
        }
        self.save(&map).await
    }

    async fn remove_many(&self, keys: &[&str]) -> StoreResult<()> {
        let mut map = self.inner.lock().await;
        for key in keys {
            map.remove(*key);
        }
        self.save(&map).await
    }
}
