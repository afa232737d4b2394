use log::{debug, warn};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use super::schema::{header_line, TimingLogEntry};
use crate::core::StreamKind;
use crate::error::{Result, SyncError};

/// Rows between forced flushes after the first one
pub const DEFAULT_FLUSH_ROWS: usize = 30;

/// Append-only CSV writer for one stream of one trial.
///
/// The first row is flushed immediately so a started recording is durable
/// from its first unit; after that the log flushes every `flush_rows` rows.
/// All file access goes through `tokio::fs`, so a slow disk suspends the
/// router instead of stalling a runtime worker.
pub struct TimingLog {
    path: PathBuf,
    kind: StreamKind,
    writer: Option<BufWriter<File>>,
    rows: u64,
    flush_rows: usize,
    unflushed: usize,
}

impl TimingLog {
    pub async fn create(path: impl AsRef<Path>, kind: StreamKind) -> Result<Self> {
        Self::with_flush_rows(path, kind, DEFAULT_FLUSH_ROWS).await
    }

    pub async fn with_flush_rows(
        path: impl AsRef<Path>,
        kind: StreamKind,
        flush_rows: usize,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .await
            .map_err(|e| SyncError::write_failure(&path, e))?;
        let mut writer = BufWriter::new(file);

        let header = format!("{}\n", header_line(kind));
        writer
            .write_all(header.as_bytes())
            .await
            .map_err(|e| SyncError::write_failure(&path, e))?;
        writer
            .flush()
            .await
            .map_err(|e| SyncError::write_failure(&path, e))?;

        debug!("Opened {} timing log {:?}", kind, path);

        Ok(Self {
            path,
            kind,
            writer: Some(writer),
            rows: 0,
            flush_rows: flush_rows.max(1),
            unflushed: 0,
        })
    }

    pub async fn write(&mut self, entry: &TimingLogEntry) -> Result<()> {
        if entry.kind() != self.kind {
            return Err(SyncError::Config(format!(
                "{} entry written to {} timing log {:?}",
                entry.kind(),
                self.kind,
                self.path
            )));
        }

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| SyncError::write_failure(&self.path, "timing log is closed"))?;

        let row = format!("{}\n", entry.to_row());
        writer
            .write_all(row.as_bytes())
            .await
            .map_err(|e| SyncError::write_failure(&self.path, e))?;

        self.rows += 1;
        self.unflushed += 1;

        if self.rows == 1 || self.unflushed >= self.flush_rows {
            self.flush().await?;
        }

        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer
                .flush()
                .await
                .map_err(|e| SyncError::write_failure(&self.path, e))?;
            self.unflushed = 0;
        }
        Ok(())
    }

    /// Flush, sync and release the file. Safe to call more than once.
    pub async fn close(&mut self) -> Result<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };

        writer
            .flush()
            .await
            .map_err(|e| SyncError::write_failure(&self.path, e))?;
        writer
            .into_inner()
            .sync_all()
            .await
            .map_err(|e| SyncError::write_failure(&self.path, e))?;
        self.unflushed = 0;

        debug!("Closed timing log {:?} with {} rows", self.path, self.rows);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }
}

impl Drop for TimingLog {
    fn drop(&mut self) {
        // buffered rows can't be flushed without a runtime; callers close()
        if self.writer.is_some() && self.unflushed > 0 {
            warn!(
                "Timing log {:?} dropped with {} unflushed rows",
                self.path, self.unflushed
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::schema::EntryExtra;
    use tempfile::tempdir;

    fn audio_entry(sequence: u64) -> TimingLogEntry {
        TimingLogEntry {
            trial_number: 1,
            stream_id: "mic".to_string(),
            wall_time: 10.0,
            monotonic_ns: sequence * 20_000_000,
            sequence,
            extra: EntryExtra::Audio {
                chunk_index: sequence,
                sample_count: 960,
                sensor_time_ns: None,
            },
        }
    }

    #[tokio::test]
    async fn test_first_row_is_flushed_immediately() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mic.csv");
        let mut log = TimingLog::with_flush_rows(&path, StreamKind::Audio, 1000)
            .await
            .unwrap();

        log.write(&audio_entry(0)).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_kind_mismatch_rejected() {
        let dir = tempdir().unwrap();
        let mut log = TimingLog::create(dir.path().join("cam.csv"), StreamKind::Video)
            .await
            .unwrap();

        assert!(log.write(&audio_entry(0)).await.is_err());
        assert_eq!(log.rows(), 0);
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let dir = tempdir().unwrap();
        let mut log = TimingLog::create(dir.path().join("mic.csv"), StreamKind::Audio)
            .await
            .unwrap();
        log.close().await.unwrap();

        let err = log.write(&audio_entry(0)).await.unwrap_err();
        assert!(matches!(err, SyncError::WriteFailure { .. }));
    }
}
