use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufWriter};

use super::RecordingSink;
use crate::core::{CapturedUnit, Payload};

/// Appends frame bytes back to back, without a container.
///
/// Frame geometry is not stored in the file; the muxer gets it from the
/// module configuration.
pub struct RawVideoSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    frames: u64,
    bytes: u64,
    /// File length before the latest frame
    last_frame_start: Option<u64>,
}

impl RawVideoSink {
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .await
            .with_context(|| format!("Failed to create video file {:?}", path))?;

        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            frames: 0,
            bytes: 0,
            last_frame_start: None,
        })
    }
}

#[async_trait]
impl RecordingSink for RawVideoSink {
    async fn write(&mut self, unit: &CapturedUnit) -> Result<u64> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| anyhow!("Video file {:?} is closed", self.path))?;

        let data = match &unit.payload {
            Payload::Video { data, .. } | Payload::Bytes(data) => data,
            Payload::Audio { .. } => {
                return Err(anyhow!("Audio unit {} sent to video sink", unit.sequence_number))
            }
        };

        writer
            .write_all(data)
            .await
            .with_context(|| format!("Failed to write frame to {:?}", self.path))?;

        let index = self.frames;
        self.last_frame_start = Some(self.bytes);
        self.bytes += data.len() as u64;
        self.frames += 1;
        Ok(index)
    }

    async fn discard_last(&mut self) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| anyhow!("Video file {:?} is closed", self.path))?;
        let len = self
            .last_frame_start
            .take()
            .ok_or_else(|| anyhow!("No frame to discard in {:?}", self.path))?;

        writer.flush().await?;
        let file = writer.get_mut();
        file.set_len(len)
            .await
            .with_context(|| format!("Failed to truncate {:?}", self.path))?;
        file.seek(SeekFrom::Start(len)).await?;

        self.bytes = len;
        self.frames -= 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .await
                .with_context(|| format!("Failed to flush {:?}", self.path))?;
            writer.into_inner().sync_all().await?;
        }
        Ok(())
    }

    fn units_written(&self) -> u64 {
        self.frames
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn frame(seq: u64, fill: u8) -> CapturedUnit {
        CapturedUnit::new(
            Payload::Video {
                width: 2,
                height: 2,
                data: Arc::from(vec![fill; 4]),
            },
            seq,
            None,
            seq * 33_000_000,
            0.0,
        )
    }

    #[tokio::test]
    async fn test_frames_appended_back_to_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cam.raw");
        let mut sink = RawVideoSink::create(&path).await.unwrap();

        assert_eq!(sink.write(&frame(0, 1)).await.unwrap(), 0);
        assert_eq!(sink.write(&frame(1, 2)).await.unwrap(), 1);
        sink.close().await.unwrap();
        sink.close().await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 1, 1, 1, 2, 2, 2, 2]);
    }

    #[tokio::test]
    async fn test_discard_last_truncates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cam.raw");
        let mut sink = RawVideoSink::create(&path).await.unwrap();

        sink.write(&frame(0, 1)).await.unwrap();
        sink.write(&frame(1, 2)).await.unwrap();
        sink.discard_last().await.unwrap();
        assert_eq!(sink.units_written(), 1);
        // only one unit can be taken back
        assert!(sink.discard_last().await.is_err());

        assert_eq!(sink.write(&frame(2, 3)).await.unwrap(), 1);
        sink.close().await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 1, 1, 1, 3, 3, 3, 3]);
    }
}
