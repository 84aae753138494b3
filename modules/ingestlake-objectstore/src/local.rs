use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ingestlake_common::{IngestError, Result};
use tokio::fs;

use crate::key::validate_object_key;
use crate::ObjectStore;

/// Filesystem-backed object store, rooted at a single directory. Used in
/// dev and in every test that doesn't need a real S3-compatible backend.
pub struct LocalFsObjectStore {
    root: PathBuf,
}

impl LocalFsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        validate_object_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ObjectStore for LocalFsObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| IngestError::Other(e.into()))?;
        }
        fs::write(&path, bytes).await.map_err(|e| IngestError::Other(e.into()))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.resolve(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(IngestError::Other(e.into())),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IngestError::Other(e.into())),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut out = Vec::new();
        let base = self.root.clone();
        let walk_root = if prefix.is_empty() {
            base.clone()
        } else {
            validate_object_key(prefix)?;
            base.join(prefix)
        };
        if !walk_root.exists() {
            return Ok(out);
        }
        walk(&base, &walk_root, &mut out).await?;
        Ok(out)
    }
}

fn walk<'a>(
    base: &'a Path,
    dir: &'a Path,
    out: &'a mut Vec<String>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = fs::read_dir(dir).await.map_err(|e| IngestError::Other(e.into()))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| IngestError::Other(e.into()))? {
            let path = entry.path();
            if path.is_dir() {
                walk(base, &path, out).await?;
            } else if let Ok(relative) = path.strip_prefix(base) {
                out.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsObjectStore::new(dir.path());
        store.put("a/b/c.ndjson", b"hello".to_vec()).await.unwrap();
        let back = store.get("a/b/c.ndjson").await.unwrap().unwrap();
        assert_eq!(back, b"hello");
    }

    #[tokio::test]
    async fn get_missing_key_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsObjectStore::new(dir.path());
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_returns_keys_under_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsObjectStore::new(dir.path());
        store.put("run-1/0000.ndjson", b"a".to_vec()).await.unwrap();
        store.put("run-1/0001.ndjson", b"b".to_vec()).await.unwrap();
        store.put("run-2/0000.ndjson", b"c".to_vec()).await.unwrap();

        let mut keys = store.list("run-1").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["run-1/0000.ndjson", "run-1/0001.ndjson"]);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsObjectStore::new(dir.path());
        store.delete("never-existed").await.unwrap();
    }

    #[tokio::test]
    async fn rejects_traversal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsObjectStore::new(dir.path());
        assert!(store.put("../escape", b"x".to_vec()).await.is_err());
    }
}
