//! Error taxonomy for the capture and synchronization core.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::protocol::ErrorKind;

/// Errors raised by the timing core.
///
/// Buffer overflow is deliberately absent: dropping the oldest unit is normal
/// operation and only shows up in metrics.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The capture source stopped delivering units or disconnected.
    #[error("producer lost ({source_id}): {detail}")]
    ProducerLost { source_id: String, detail: String },

    /// The capture source reported a failure while opening or reading.
    #[error("capture failed: {0}")]
    Capture(String),

    /// A media or timing-log write failed.
    #[error("write to {path:?} failed: {detail}")]
    WriteFailure { path: PathBuf, detail: String },

    /// Invalid rate, capacity, path, or other configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A timing log did not match its schema.
    #[error("malformed timing log {path:?}: {detail}")]
    MalformedLog { path: PathBuf, detail: String },

    /// A timing log was missing, unreadable, or empty.
    #[error("offset computation failed: {0}")]
    OffsetComputation(String),

    /// Command does not make sense in the current session state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    pub fn write_failure(path: impl Into<PathBuf>, detail: impl ToString) -> Self {
        Self::WriteFailure {
            path: path.into(),
            detail: detail.to_string(),
        }
    }

    /// Status-protocol classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ProducerLost { .. } => ErrorKind::ProducerLost,
            Self::Capture(_) => ErrorKind::ProducerLost,
            Self::WriteFailure { .. } | Self::Io(_) => ErrorKind::WriteFailure,
            Self::Config(_) | Self::Json(_) => ErrorKind::ConfigError,
            Self::OffsetComputation(_) | Self::MalformedLog { .. } => {
                ErrorKind::OffsetComputation
            }
            Self::InvalidState(_) => ErrorKind::InvalidState,
        }
    }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
