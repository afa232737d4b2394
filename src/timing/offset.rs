use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::reader::read_timing_log;
use crate::core::StreamKind;
use crate::engine::session::sync_metadata_path;
use crate::error::{Result, SyncError};

/// Session length beyond which a single constant offset is no longer trusted
pub const DRIFT_BUDGET_SECONDS: f64 = 3600.0;

/// Where and when one stream's timing log starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamStart {
    pub stream_id: String,
    pub kind: StreamKind,
    pub timing_log: PathBuf,
    pub start_wall_time: f64,
    pub start_monotonic_time: f64,
    pub rows: usize,
    pub duration_seconds: f64,
}

/// Offset of `other` relative to `reference`.
///
/// Positive means `other` started after `reference` and has to be delayed by
/// `offset_seconds` when the two are aligned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamOffset {
    pub reference: StreamStart,
    pub other: StreamStart,
    pub offset_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairOffset {
    pub reference: String,
    pub stream: String,
    pub offset_seconds: f64,
}

/// Per-trial record consumed by the muxing step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMetadata {
    pub trial_number: u32,
    pub reference_stream: String,
    pub streams: Vec<StreamStart>,
    pub offsets: Vec<PairOffset>,
    pub drift_exceeds_budget: bool,
}

impl SyncMetadata {
    pub fn stream(&self, stream_id: &str) -> Option<&StreamStart> {
        self.streams.iter().find(|s| s.stream_id == stream_id)
    }

    pub fn offset_of(&self, stream_id: &str) -> Option<f64> {
        if stream_id == self.reference_stream {
            return Some(0.0);
        }
        self.offsets
            .iter()
            .find(|o| o.stream == stream_id)
            .map(|o| o.offset_seconds)
    }

    /// Write `trial_NNN_sync.json` into `dir`
    pub fn write(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let path = sync_metadata_path(dir.as_ref(), self.trial_number);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json).map_err(|e| SyncError::write_failure(&path, e))?;
        info!("Wrote sync metadata for trial {} to {:?}", self.trial_number, path);
        Ok(path)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Computes start offsets between streams from their timing logs.
///
/// Uses first-row wall-clock times only; alignment is a constant shift and
/// clock drift within a session is not corrected.
pub struct OffsetCalculator;

impl OffsetCalculator {
    pub fn stream_start(path: impl AsRef<Path>) -> Result<StreamStart> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SyncError::OffsetComputation(format!(
                "timing log {:?} does not exist",
                path
            )));
        }

        let contents = read_timing_log(path).map_err(|e| {
            SyncError::OffsetComputation(format!("cannot read {:?}: {}", path, e))
        })?;

        let first = contents.first().ok_or_else(|| {
            SyncError::OffsetComputation(format!("timing log {:?} has no rows", path))
        })?;

        Ok(StreamStart {
            stream_id: first.stream_id.clone(),
            kind: contents.kind,
            timing_log: path.to_path_buf(),
            start_wall_time: first.wall_time,
            start_monotonic_time: first.monotonic_time,
            rows: contents.len(),
            duration_seconds: contents.duration_seconds(),
        })
    }

    /// `start(b) - start(a)` in seconds, rounded to the microsecond
    pub fn offset(a: impl AsRef<Path>, b: impl AsRef<Path>) -> Result<StreamOffset> {
        let reference = Self::stream_start(a)?;
        let other = Self::stream_start(b)?;
        let offset_seconds = offset_between(&reference, &other);

        Ok(StreamOffset {
            reference,
            other,
            offset_seconds,
        })
    }

    /// Offsets of every stream relative to the first one
    pub fn sync_metadata<P: AsRef<Path>>(trial_number: u32, logs: &[P]) -> Result<SyncMetadata> {
        let streams = logs
            .iter()
            .map(|path| Self::stream_start(path))
            .collect::<Result<Vec<_>>>()?;

        let reference = streams.first().ok_or_else(|| {
            SyncError::OffsetComputation(format!("no timing logs given for trial {}", trial_number))
        })?;

        let reference_stream = reference.stream_id.clone();
        let offsets = streams
            .iter()
            .skip(1)
            .map(|other| PairOffset {
                reference: reference.stream_id.clone(),
                stream: other.stream_id.clone(),
                offset_seconds: offset_between(reference, other),
            })
            .collect();

        let longest = streams
            .iter()
            .map(|s| s.duration_seconds)
            .fold(0.0, f64::max);
        let drift_exceeds_budget = longest > DRIFT_BUDGET_SECONDS;
        if drift_exceeds_budget {
            warn!(
                "Trial {} runs {:.0}s; a single start offset may drift beyond tolerance",
                trial_number, longest
            );
        }

        Ok(SyncMetadata {
            trial_number,
            reference_stream,
            streams,
            offsets,
            drift_exceeds_budget,
        })
    }
}

fn offset_between(reference: &StreamStart, other: &StreamStart) -> f64 {
    ((other.start_wall_time - reference.start_wall_time) * 1e6).round() / 1e6
}
