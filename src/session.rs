//! Client-side upload session data model (spec.md §3).

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

/// Controller state machine (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Splitting,
    Uploading,
    Paused,
    Merging,
    Completed,
    Error,
}

/// One chunk descriptor as produced by the splitter, tracked through its
/// upload lifecycle by the controller.
#[derive(Debug, Clone)]
pub struct ChunkDescriptor {
    pub index: u32,
    pub start: u64,
    pub end: u64,
    pub digest: Option<String>,
}

impl ChunkDescriptor {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The client-side record of one upload attempt, from `start()` through
/// `COMPLETED`/`ERROR`/cancellation.
pub struct UploadSession {
    pub file_path: PathBuf,
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,

    pub status: SessionStatus,
    pub upload_token: Option<String>,
    pub chunk_size: u64,
    pub whole_hash: Option<String>,

    pub chunks: Vec<ChunkDescriptor>,
    pub uploaded_chunks: std::collections::HashSet<u32>,
    pub failed_chunks: HashMap<u32, u32>,

    pub uploaded_bytes: u64,
    pub window_started_at: Instant,
    pub window_started_bytes: u64,
}

impl UploadSession {
    pub fn new(file_path: PathBuf, file_name: String, file_size: u64, file_type: String, chunk_size: u64) -> Self {
        Self {
            file_path,
            file_name,
            file_size,
            file_type,
            status: SessionStatus::Idle,
            upload_token: None,
            chunk_size,
            whole_hash: None,
            chunks: Vec::new(),
            uploaded_chunks: std::collections::HashSet::new(),
            failed_chunks: HashMap::new(),
            uploaded_bytes: 0,
            window_started_at: Instant::now(),
            window_started_bytes: 0,
        }
    }

    pub fn total_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_fully_uploaded(&self) -> bool {
        !self.chunks.is_empty() && self.uploaded_chunks.len() == self.chunks.len()
    }

    /// Ordered digests for the merge request; panics if any chunk lacks a
    /// digest yet, which would be a controller bug (digests are filled
    /// before a chunk is enqueued).
    pub fn ordered_digests(&self) -> Vec<String> {
        let mut ordered: Vec<&ChunkDescriptor> = self.chunks.iter().collect();
        ordered.sort_by_key(|c| c.index);
        ordered.iter().map(|c| c.digest.clone().expect("chunk digest missing before merge")).collect()
    }
}
