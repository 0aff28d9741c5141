//! Error types for the Parcel upload client.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("splitter error: {0}")]
    Splitter(#[from] parcel_splitter::SplitterError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] parcel_scheduler::SchedulerError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("chunk {index} upload failed: {source}")]
    ChunkFailed { index: u32, source: Box<ClientError> },

    #[error("upload cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl ClientError {
    /// Worth retrying under the controller's backoff policy.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Transport(err) => {
                err.is_timeout() || err.is_connect() || err.status().map(|s| s.is_server_error()).unwrap_or(false)
            }
            ClientError::Io(io_err) => Self::is_io_transient(io_err),
            _ => false,
        }
    }

    /// Never worth retrying; the controller should move straight to `ERROR`.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClientError::Validation(_) | ClientError::Unauthorized(_) | ClientError::Integrity(_) | ClientError::Config(_)
        )
    }

    fn is_io_transient(io_err: &std::io::Error) -> bool {
        use std::io::ErrorKind::*;
        matches!(
            io_err.kind(),
            ConnectionRefused | ConnectionReset | ConnectionAborted | NotConnected | BrokenPipe | TimedOut | Interrupted | WouldBlock
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_fatal_not_transient() {
        let err = ClientError::Validation("missing fileName".to_string());
        assert!(err.is_fatal());
        assert!(!err.is_transient());
    }

    #[test]
    fn io_timeouts_are_transient() {
        let err = ClientError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow disk"));
        assert!(err.is_transient());
        assert!(!err.is_fatal());
    }

    #[test]
    fn integrity_errors_are_fatal() {
        let err = ClientError::Integrity("digest mismatch".to_string());
        assert!(err.is_fatal());
    }
}
