//! Content-addressed chunk storage: `chunks/<digest[0:2]>/<digest>.chunk`,
//! idempotent writes, mandatory digest re-verification on arrival.

use crate::error::{ServerError, ServerResult};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

pub struct ChunkStore {
    root: PathBuf,
}

impl ChunkStore {
    pub async fn new(root: PathBuf) -> ServerResult<Self> {
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn path_for(&self, digest: &str) -> PathBuf {
        let shard = &digest[..2.min(digest.len())];
        self.root.join(shard).join(format!("{digest}.chunk"))
    }

    pub async fn has(&self, digest: &str) -> bool {
        tokio::fs::metadata(self.path_for(digest)).await.is_ok()
    }

    /// Persist `bytes` under `digest`, recomputing the digest first and
    /// rejecting the write if it disagrees with the caller's claim. A
    /// chunk already on disk under this digest is left untouched.
    pub async fn write(&self, digest: &str, bytes: &[u8]) -> ServerResult<()> {
        let actual = parcel_fingerprint::digest(bytes);
        if actual != digest {
            return Err(ServerError::Integrity(format!(
                "chunk digest mismatch: claimed {digest}, computed {actual}"
            )));
        }

        if self.has(digest).await {
            return Ok(());
        }

        let path = self.path_for(digest);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp_path = path.with_extension("chunk.tmp");
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&tmp_path, &path).await?;

        Ok(())
    }

    pub async fn open(&self, digest: &str) -> ServerResult<tokio::fs::File> {
        let path = self.path_for(digest);
        tokio::fs::File::open(&path)
            .await
            .map_err(|_| ServerError::NotFound(format!("chunk {digest} not found")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_are_idempotent_and_sharded() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::new(dir.path().to_path_buf()).await.unwrap();

        let data = b"hello chunk";
        let digest = parcel_fingerprint::digest(data);

        store.write(&digest, data).await.unwrap();
        assert!(store.has(&digest).await);
        assert!(store.path_for(&digest).starts_with(dir.path()));
        assert!(store.path_for(&digest).to_string_lossy().contains(&digest[..2]));

        // Second write of identical content is a no-op, not an error.
        store.write(&digest, data).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_content_that_does_not_match_the_claimed_digest() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::new(dir.path().to_path_buf()).await.unwrap();

        let fake_digest = parcel_fingerprint::digest(b"other content");
        let result = store.write(&fake_digest, b"hello chunk").await;
        assert!(result.is_err());
        assert!(!store.has(&fake_digest).await);
    }
}
