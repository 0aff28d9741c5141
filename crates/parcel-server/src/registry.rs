//! Session registry: persisted per-upload metadata plus an in-memory index
//! for fast lookup, including a secondary whole-file-digest index so
//! dedup checks don't need to scan every record on disk.

use crate::error::{ServerError, ServerResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Uploading,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub upload_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
    pub status: SessionStatus,
    /// Ordered chunk digests; only populated at merge time.
    pub chunks: Vec<String>,
    pub file_hash: Option<String>,
    pub artifact_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

pub struct Registry {
    metadata_dir: PathBuf,
    records: Arc<RwLock<HashMap<String, SessionRecord>>>,
    by_hash: Arc<RwLock<HashMap<String, String>>>,
}

impl Registry {
    /// Load whatever session records already exist on disk (e.g. after a
    /// restart) and rebuild the in-memory indexes from them.
    pub async fn load(metadata_dir: PathBuf) -> ServerResult<Self> {
        tokio::fs::create_dir_all(&metadata_dir).await?;

        let mut records = HashMap::new();
        let mut by_hash = HashMap::new();

        let mut entries = tokio::fs::read_dir(&metadata_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = tokio::fs::read_to_string(&path).await?;
            let record: SessionRecord = serde_json::from_str(&content)?;
            if record.status == SessionStatus::Completed {
                if let Some(ref hash) = record.file_hash {
                    by_hash.insert(hash.clone(), record.upload_id.clone());
                }
            }
            records.insert(record.upload_id.clone(), record);
        }

        Ok(Self {
            metadata_dir,
            records: Arc::new(RwLock::new(records)),
            by_hash: Arc::new(RwLock::new(by_hash)),
        })
    }

    pub async fn create(
        &self,
        upload_id: String,
        file_name: String,
        file_size: u64,
        file_type: String,
    ) -> ServerResult<SessionRecord> {
        let ts = now();
        let record = SessionRecord {
            upload_id: upload_id.clone(),
            file_name,
            file_size,
            file_type,
            status: SessionStatus::Uploading,
            chunks: Vec::new(),
            file_hash: None,
            artifact_url: None,
            created_at: ts,
            updated_at: ts,
        };

        self.persist(&record).await?;
        self.records.write().await.insert(upload_id, record.clone());
        Ok(record)
    }

    pub async fn get(&self, upload_id: &str) -> Option<SessionRecord> {
        self.records.read().await.get(upload_id).cloned()
    }

    /// Lookup a completed session by its whole-file digest, for
    /// cross-session (whole-file) dedup.
    pub async fn find_by_hash(&self, file_hash: &str) -> Option<SessionRecord> {
        let upload_id = self.by_hash.read().await.get(file_hash).cloned()?;
        self.get(&upload_id).await
    }

    /// Finalize a session at merge time: populate the ordered chunk
    /// digest list, the whole-file hash, and the artifact URL, in one
    /// atomic record write.
    pub async fn complete(
        &self,
        upload_id: &str,
        file_hash: String,
        chunks: Vec<String>,
        artifact_url: String,
    ) -> ServerResult<SessionRecord> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(upload_id)
            .ok_or_else(|| ServerError::NotFound(format!("unknown upload id {upload_id}")))?;

        record.status = SessionStatus::Completed;
        record.chunks = chunks;
        record.file_hash = Some(file_hash.clone());
        record.artifact_url = Some(artifact_url);
        record.updated_at = now();
        let snapshot = record.clone();
        drop(records);

        self.persist(&snapshot).await?;
        self.by_hash.write().await.insert(file_hash, upload_id.to_string());
        Ok(snapshot)
    }

    async fn persist(&self, record: &SessionRecord) -> ServerResult<()> {
        let path = self.metadata_dir.join(format!("{}.json", record.upload_id));
        let content = serde_json::to_string_pretty(record)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_complete_round_trips_and_indexes_by_hash() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::load(dir.path().join("metadata")).await.unwrap();

        let created = registry
            .create("up-1".into(), "a.bin".into(), 2048, "application/octet-stream".into())
            .await
            .unwrap();
        assert_eq!(created.status, SessionStatus::Uploading);

        let completed = registry
            .complete("up-1", "deadbeef".into(), vec!["c0".into(), "c1".into()], "/api/upload/file/up-1/a.bin".into())
            .await
            .unwrap();
        assert_eq!(completed.status, SessionStatus::Completed);

        let found = registry.find_by_hash("deadbeef").await.unwrap();
        assert_eq!(found.upload_id, "up-1");
    }

    #[tokio::test]
    async fn reloading_from_disk_restores_completed_index() {
        let dir = tempfile::tempdir().unwrap();
        let metadata_dir = dir.path().join("metadata");

        {
            let registry = Registry::load(metadata_dir.clone()).await.unwrap();
            registry
                .create("up-2".into(), "b.bin".into(), 10, "text/plain".into())
                .await
                .unwrap();
            registry
                .complete("up-2", "cafebabe".into(), vec!["only".into()], "/url".into())
                .await
                .unwrap();
        }

        let reloaded = Registry::load(metadata_dir).await.unwrap();
        let found = reloaded.find_by_hash("cafebabe").await;
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn complete_on_unknown_session_fails() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::load(dir.path().join("metadata")).await.unwrap();
        let result = registry.complete("missing", "h".into(), vec![], "/url".into()).await;
        assert!(result.is_err());
    }
}
