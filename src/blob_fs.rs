//! Content-addressed blob storage on the local filesystem.
//!
//! Raw captures are written to `<root>/<first two hex chars>/<sha256>`.
//! Keys have the form `sha256/<checksum>`, the same as the in-memory
//! store, so blob records stay portable between backends.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use lexgraph_core::embedding::checksum;
use lexgraph_core::store::{BlobRef, BlobStore};

const KEY_PREFIX: &str = "sha256/";

pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let sum = match key.strip_prefix(KEY_PREFIX) {
            Some(sum) if sum.len() > 2 && sum.chars().all(|c| c.is_ascii_hexdigit()) => sum,
            _ => bail!("invalid blob key: {}", key),
        };
        Ok(self.root.join(&sum[..2]).join(sum))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, bytes: &[u8]) -> Result<BlobRef> {
        let sum = checksum(bytes);
        let key = format!("{}{}", KEY_PREFIX, sum);
        let path = self.path_for(&key)?;

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            // A blob under its final name is always complete.
            let tmp = path.with_extension("tmp");
            tokio::fs::write(&tmp, bytes)
                .await
                .with_context(|| format!("Failed to write {}", tmp.display()))?;
            tokio::fs::rename(&tmp, &path).await?;
        }

        Ok(BlobRef {
            key,
            checksum: sum,
            size: bytes.len() as u64,
        })
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to clear {}", self.root.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_is_content_addressed() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStore::new(dir.path().join("blobs"));

        let a = blobs.put(b"statute text").await.unwrap();
        let b = blobs.put(b"statute text").await.unwrap();
        assert_eq!(a, b);
        assert!(a.key.starts_with("sha256/"));
        assert_eq!(a.size, 12);

        let on_disk = dir
            .path()
            .join("blobs")
            .join(&a.checksum[..2])
            .join(&a.checksum);
        assert!(on_disk.is_file());
        assert_eq!(blobs.get(&a.key).await.unwrap().unwrap(), b"statute text");
    }

    #[tokio::test]
    async fn missing_and_invalid_keys() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStore::new(dir.path());
        let missing = format!("sha256/{}", "ab".repeat(32));
        assert!(blobs.get(&missing).await.unwrap().is_none());
        assert!(blobs.get("../../etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStore::new(dir.path().join("blobs"));
        let r = blobs.put(b"x").await.unwrap();
        blobs.clear().await.unwrap();
        assert!(blobs.get(&r.key).await.unwrap().is_none());
        // clearing an absent root is fine
        blobs.clear().await.unwrap();
    }
}
