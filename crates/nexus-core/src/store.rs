//! Persistence contract: `get`/`put`/`compare_and_set`/`scan`/`delete`.
//!
//! The core never assumes cross-key transactions; per-key compare-and-set
//! is the only atomicity primitive callers get, and the quota engine is the
//! component that actually leans on it.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{NexusError, NexusResult};

#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> NexusResult<Option<Vec<u8>>>;
    async fn put(&self, key: &str, value: Vec<u8>) -> NexusResult<()>;

    /// Atomically sets `key` to `new` iff the current value equals `expected`
    /// (`None` meaning "key must be absent"). Returns whether the swap took
    /// place.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<Vec<u8>>,
        new: Vec<u8>,
    ) -> NexusResult<bool>;

    async fn scan(&self, prefix: &str) -> NexusResult<Vec<(String, Vec<u8>)>>;
    async fn delete(&self, key: &str) -> NexusResult<()>;
}

/// In-process store backed by a `DashMap`. Default for tests and dev config.
#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<DashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> NexusResult<Option<Vec<u8>>> {
        Ok(self.data.get(key).map(|v| v.clone()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> NexusResult<()> {
        self.data.insert(key.to_string(), value);
        Ok(())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<Vec<u8>>,
        new: Vec<u8>,
    ) -> NexusResult<bool> {
        // DashMap's entry API gives us a per-shard lock for the duration of
        // the check-then-set, matching the linearizability the quota engine
        // needs per key.
        use dashmap::mapref::entry::Entry;
        match self.data.entry(key.to_string()) {
            Entry::Occupied(mut occ) => {
                if Some(occ.get().clone()) == expected {
                    occ.insert(new);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vac) => {
                if expected.is_none() {
                    vac.insert(new);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    async fn scan(&self, prefix: &str) -> NexusResult<Vec<(String, Vec<u8>)>> {
        Ok(self
            .data
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect())
    }

    async fn delete(&self, key: &str) -> NexusResult<()> {
        self.data.remove(key);
        Ok(())
    }
}

/// One JSON-wrapped-bytes file per key under `root`, guarded by a process
/// wide lock for the read-modify-write CAS path.
#[derive(Clone)]
pub struct FileStore {
    root: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FileStore {
    pub async fn new(root: impl Into<PathBuf>) -> NexusResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| NexusError::internal(format!("failed to create store dir: {e}")))?;
        Ok(Self {
            root,
            lock: Arc::new(Mutex::new(())),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are prefixed by entity kind and may contain ':' separators;
        // flatten to a safe filename.
        let safe: String = key
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.root.join(format!("{safe}.json"))
    }

    async fn read_raw(path: &Path) -> NexusResult<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(NexusError::internal(format!("store read failed: {e}"))),
        }
    }
}

#[async_trait]
impl Store for FileStore {
    async fn get(&self, key: &str) -> NexusResult<Option<Vec<u8>>> {
        Self::read_raw(&self.path_for(key)).await
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> NexusResult<()> {
        let _guard = self.lock.lock();
        tokio::fs::write(self.path_for(key), value)
            .await
            .map_err(|e| NexusError::internal(format!("store write failed: {e}")))
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<Vec<u8>>,
        new: Vec<u8>,
    ) -> NexusResult<bool> {
        let _guard = self.lock.lock();
        let current = Self::read_raw(&self.path_for(key)).await?;
        if current == expected {
            tokio::fs::write(self.path_for(key), new)
                .await
                .map_err(|e| NexusError::internal(format!("store write failed: {e}")))?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn scan(&self, prefix: &str) -> NexusResult<Vec<(String, Vec<u8>)>> {
        let _guard = self.lock.lock();
        let mut out = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| NexusError::internal(format!("store scan failed: {e}")))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| NexusError::internal(format!("store scan failed: {e}")))?
        {
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            let Some(stem) = name.strip_suffix(".json") else { continue };
            if !stem.starts_with(prefix) {
                continue;
            }
            if let Some(bytes) = Self::read_raw(&entry.path()).await? {
                out.push((stem.to_string(), bytes));
            }
        }
        Ok(out)
    }

    async fn delete(&self, key: &str) -> NexusResult<()> {
        let _guard = self.lock.lock();
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(NexusError::internal(format!("store delete failed: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_put_get_delete() {
        let store = MemoryStore::new();
        store.put("user:1", b"alice".to_vec()).await.unwrap();
        assert_eq!(store.get("user:1").await.unwrap(), Some(b"alice".to_vec()));
        store.delete("user:1").await.unwrap();
        assert_eq!(store.get("user:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_store_cas_rejects_mismatch() {
        let store = MemoryStore::new();
        store.put("k", b"v1".to_vec()).await.unwrap();
        let ok = store
            .compare_and_set("k", Some(b"wrong".to_vec()), b"v2".to_vec())
            .await
            .unwrap();
        assert!(!ok);
        assert_eq!(store.get("k").await.unwrap(), Some(b"v1".to_vec()));

        let ok = store
            .compare_and_set("k", Some(b"v1".to_vec()), b"v2".to_vec())
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(store.get("k").await.unwrap(), Some(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn memory_store_cas_absent_key() {
        let store = MemoryStore::new();
        let ok = store.compare_and_set("new", None, b"v1".to_vec()).await.unwrap();
        assert!(ok);
        let ok = store.compare_and_set("new", None, b"v2".to_vec()).await.unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn memory_store_scan_prefix() {
        let store = MemoryStore::new();
        store.put("org:1", b"a".to_vec()).await.unwrap();
        store.put("org:2", b"b".to_vec()).await.unwrap();
        store.put("user:1", b"c".to_vec()).await.unwrap();
        let results = store.scan("org:").await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::new(dir.path()).await.unwrap();
            store.put("session:abc", b"hello".to_vec()).await.unwrap();
        }
        let store = FileStore::new(dir.path()).await.unwrap();
        assert_eq!(store.get("session:abc").await.unwrap(), Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn file_store_cas_and_scan() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();
        assert!(store.compare_and_set("quota:o1:calls", None, b"1".to_vec()).await.unwrap());
        assert!(!store.compare_and_set("quota:o1:calls", None, b"2".to_vec()).await.unwrap());
        assert!(store
            .compare_and_set("quota:o1:calls", Some(b"1".to_vec()), b"2".to_vec())
            .await
            .unwrap());

        store.put("quota:o2:calls", b"9".to_vec()).await.unwrap();
        let scanned = store.scan("quota:o1").await.unwrap();
        assert_eq!(scanned.len(), 1);
    }
}
