use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

use crate::core::CapturedUnit;
use crate::engine::session::TrialPaths;

/// Permanent media output of one stream in one trial
#[async_trait]
pub trait RecordingSink: Send {
    /// Append one unit and return its index within the media file
    async fn write(&mut self, unit: &CapturedUnit) -> Result<u64>;

    /// Remove the unit from the most recent `write`, so the file again ends
    /// where the timing log does. Only the latest unit can be discarded.
    async fn discard_last(&mut self) -> Result<()>;

    /// Flush and release the file. Must tolerate repeated calls.
    async fn close(&mut self) -> Result<()>;

    fn units_written(&self) -> u64;

    fn path(&self) -> &Path;
}

/// Live view consumer; may skip units freely
#[async_trait]
pub trait PreviewSink: Send {
    async fn present(&mut self, unit: CapturedUnit) -> Result<()>;
}

/// Opens the recording sink for a new trial
#[async_trait]
pub trait SinkFactory: Send + Sync {
    async fn open_recording(&self, paths: &TrialPaths) -> Result<Box<dyn RecordingSink>>;
}
