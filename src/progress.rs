//! Typed progress/status events emitted by the Upload Controller, replacing
//! the reference implementation's ad-hoc event bus (spec.md §9) with a
//! tagged variant message passed through a single mailbox.

use crate::error::ClientError;
use crate::session::SessionStatus;

#[derive(Debug, Clone)]
pub struct Progress {
    pub loaded: u64,
    pub total: u64,
    pub percentage: f64,
    pub speed: f64,
    pub remaining_time: Option<f64>,
    pub uploaded_chunks: usize,
    pub total_chunks: usize,
}

impl Progress {
    pub fn compute(loaded: u64, total: u64, speed: f64, uploaded_chunks: usize, total_chunks: usize) -> Self {
        let percentage = if total == 0 { 100.0 } else { (loaded as f64 / total as f64) * 100.0 };
        let remaining_time = if speed > 0.0 { Some((total.saturating_sub(loaded)) as f64 / speed) } else { None };

        Self { loaded, total, percentage, speed, remaining_time, uploaded_chunks, total_chunks }
    }
}

/// A single controller event. Consumers drain these from a `tokio::sync::mpsc`
/// channel; exactly one of `Complete`/`Error` terminates a session.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    StatusChange(SessionStatus),
    Progress(Progress),
    Complete(String),
    Error(String),
}

impl UploadEvent {
    pub fn error(err: &ClientError) -> Self {
        UploadEvent::Error(err.to_string())
    }
}
