use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::observability::MetricsReport;

/// Classification carried by `error` statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ProducerLost,
    WriteFailure,
    PreviewFailure,
    ConfigError,
    OffsetComputation,
    InvalidState,
    InvalidCommand,
}

/// Outbound status line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
    #[serde(flatten)]
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Status {
    Ready {
        module: String,
        stream_id: String,
    },
    /// Sent once the first unit of the trial is durably logged
    RecordingStarted {
        trial_number: u32,
        timing_log: PathBuf,
        media_file: PathBuf,
    },
    RecordingStopped {
        trial_number: u32,
        frame_count: u64,
        errored: bool,
    },
    ConfigApplied {
        record_rate_hz: Option<f64>,
        preview_rate_hz: Option<f64>,
    },
    StatusReport {
        state: String,
        trial_number: Option<u32>,
        preview_enabled: bool,
        metrics: MetricsReport,
    },
    Metrics {
        report: MetricsReport,
    },
    DeviceError {
        detail: String,
    },
    Error {
        kind: ErrorKind,
        detail: String,
    },
    Quitting,
}

impl StatusMessage {
    pub fn new(status: Status) -> Self {
        Self {
            in_reply_to: None,
            status,
        }
    }

    pub fn reply(in_reply_to: Option<String>, status: Status) -> Self {
        Self {
            in_reply_to,
            status,
        }
    }

    pub fn error(in_reply_to: Option<String>, kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self::reply(
            in_reply_to,
            Status::Error {
                kind,
                detail: detail.into(),
            },
        )
    }

    /// Single-line JSON
    pub fn to_line(&self) -> String {
        // only non-UTF-8 paths fail to serialize
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({
                "in_reply_to": self.in_reply_to,
                "status": "error",
                "kind": "write_failure",
                "detail": e.to_string(),
            })
            .to_string()
        })
    }
}
