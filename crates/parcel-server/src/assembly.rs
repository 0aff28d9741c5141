//! Assembly service: materializes the final artifact for a completed
//! session by streaming its chunks, in order, into a single file the
//! first time it's requested, then serves that file directly afterward.

use crate::chunk_store::ChunkStore;
use crate::error::{ServerError, ServerResult};
use crate::registry::SessionRecord;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

pub struct AssemblyService {
    files_root: PathBuf,
}

impl AssemblyService {
    pub async fn new(files_root: PathBuf) -> ServerResult<Self> {
        tokio::fs::create_dir_all(&files_root).await?;
        Ok(Self { files_root })
    }

    pub fn artifact_path(&self, upload_id: &str) -> PathBuf {
        self.files_root.join(format!("{upload_id}.dat"))
    }

    /// Return the path to the materialized artifact, building it first if
    /// this is the first request for a completed session. Concatenation
    /// streams one chunk at a time through `tokio::io::copy`, so memory
    /// use stays bounded regardless of file size.
    pub async fn materialize(
        &self,
        record: &SessionRecord,
        chunk_store: &ChunkStore,
    ) -> ServerResult<PathBuf> {
        let path = self.artifact_path(&record.upload_id);
        if tokio::fs::metadata(&path).await.is_ok() {
            return Ok(path);
        }

        if record.chunks.is_empty() {
            return Err(ServerError::Integrity(
                "cannot assemble a session with no recorded chunks".to_string(),
            ));
        }

        let tmp_path = path.with_extension("dat.tmp");
        {
            let mut sink = tokio::fs::File::create(&tmp_path).await?;
            for digest in &record.chunks {
                let mut reader = chunk_store.open(digest).await?;
                tokio::io::copy(&mut reader, &mut sink).await?;
            }
            sink.flush().await?;
        }
        tokio::fs::rename(&tmp_path, &path).await?;

        Ok(path)
    }
}
