//! Common error types for the jukebox services

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Common result type for jukebox operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the jukebox services
#[derive(Error, Debug)]
pub enum Error {
    /// Queue index outside the valid range; state is left untouched
    #[error("invalid queue index {index} (queue length {len})")]
    InvalidIndex { index: usize, len: usize },

    /// Operation needs a track but the queue is empty
    #[error("queue is empty")]
    EmptyQueue,

    /// Local import rejected before any track was created
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// Remote metadata/stream lookup exhausted its retries
    #[error("resolution failed: {0}")]
    ResolutionFailed(String),

    /// External playback engine errored or stopped answering
    #[error("engine fault: {0}")]
    EngineFault(String),

    /// Background download/transcode job failed; playback is unaffected
    #[error("download failed: {0}")]
    DownloadFailed(String),

    /// Persisted list file was unreadable and has been set aside
    #[error("persisted list unreadable: {0}")]
    PersistenceCorrupt(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(String),

    /// Configuration loading or validation error
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON encode/decode error
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Machine-readable error class, carried in the status snapshot's
/// `last_error` field so polling clients can learn of absorbed failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidIndex,
    EmptyQueue,
    UnsupportedFormat,
    ResolutionFailed,
    EngineFault,
    DownloadFailed,
    PersistenceCorrupt,
    Io,
    Http,
    Config,
    Serde,
}

impl Error {
    /// Classify for the snapshot `last_error` field
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidIndex { .. } => ErrorKind::InvalidIndex,
            Error::EmptyQueue => ErrorKind::EmptyQueue,
            Error::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Error::ResolutionFailed(_) => ErrorKind::ResolutionFailed,
            Error::EngineFault(_) => ErrorKind::EngineFault,
            Error::DownloadFailed(_) => ErrorKind::DownloadFailed,
            Error::PersistenceCorrupt(_) => ErrorKind::PersistenceCorrupt,
            Error::Io(_) => ErrorKind::Io,
            Error::Http(_) => ErrorKind::Http,
            Error::Config(_) => ErrorKind::Config,
            Error::Serde(_) => ErrorKind::Serde,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_classification() {
        let err = Error::InvalidIndex { index: 7, len: 3 };
        assert_eq!(err.kind(), ErrorKind::InvalidIndex);
        assert_eq!(Error::EmptyQueue.kind(), ErrorKind::EmptyQueue);
        assert_eq!(
            Error::ResolutionFailed("timeout".into()).kind(),
            ErrorKind::ResolutionFailed
        );
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ResolutionFailed).unwrap();
        assert_eq!(json, "\"resolution_failed\"");
        let json = serde_json::to_string(&ErrorKind::EngineFault).unwrap();
        assert_eq!(json, "\"engine_fault\"");
    }

    #[test]
    fn test_display_includes_context() {
        let err = Error::InvalidIndex { index: 7, len: 3 };
        let text = err.to_string();
        assert!(text.contains('7'));
        assert!(text.contains('3'));
    }
}
