use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::RecordingSink;
use crate::config::AudioFormat;
use crate::core::{CapturedUnit, Payload};

type Writer = WavWriter<BufWriter<File>>;

fn wav_spec(format: AudioFormat) -> WavSpec {
    WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    }
}

fn write_chunk(writer: &mut Writer, samples: &[f32]) -> hound::Result<()> {
    for sample in samples {
        writer.write_sample(*sample)?;
    }
    writer.flush()
}

/// Rewrite `path` with only its first `keep` samples and reopen it for writing
fn truncate_wav(path: &Path, writer: Writer, spec: WavSpec, keep: u32) -> Result<Writer> {
    writer.finalize()?;

    let kept = WavReader::open(path)?
        .samples::<f32>()
        .take(keep as usize)
        .collect::<hound::Result<Vec<f32>>>()?;

    let mut writer = WavWriter::create(path, spec)?;
    write_chunk(&mut writer, &kept)?;
    Ok(writer)
}

/// 32-bit float WAV writer for audio chunks.
///
/// The header is rewritten after every chunk so an interrupted recording is
/// still a playable file. hound is synchronous, so every file operation runs
/// on the blocking pool.
pub struct WavSink {
    path: PathBuf,
    format: AudioFormat,
    writer: Option<Writer>,
    chunks: u64,
    /// Samples in the file before the latest chunk
    last_chunk_start: Option<u32>,
}

impl WavSink {
    pub async fn create(path: impl AsRef<Path>, format: AudioFormat) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let target = path.clone();
        let writer = tokio::task::spawn_blocking(move || WavWriter::create(&target, wav_spec(format)))
            .await?
            .with_context(|| format!("Failed to create WAV file {:?}", path))?;

        Ok(Self {
            path,
            format,
            writer: Some(writer),
            chunks: 0,
            last_chunk_start: None,
        })
    }

    fn take_writer(&mut self) -> Result<Writer> {
        self.writer
            .take()
            .ok_or_else(|| anyhow!("WAV file {:?} is closed", self.path))
    }
}

#[async_trait]
impl RecordingSink for WavSink {
    async fn write(&mut self, unit: &CapturedUnit) -> Result<u64> {
        if self.writer.is_none() {
            return Err(anyhow!("WAV file {:?} is closed", self.path));
        }

        let Payload::Audio {
            sample_rate,
            channels,
            samples,
        } = &unit.payload
        else {
            return Err(anyhow!("Unit {} is not an audio chunk", unit.sequence_number));
        };

        if *sample_rate != self.format.sample_rate || *channels != self.format.channels {
            return Err(anyhow!(
                "Chunk {} is {} Hz x{} but {:?} expects {} Hz x{}",
                unit.sequence_number,
                sample_rate,
                channels,
                self.path,
                self.format.sample_rate,
                self.format.channels
            ));
        }

        let mut writer = self.take_writer()?;
        let samples: Arc<[f32]> = samples.clone();
        let (writer, written) = tokio::task::spawn_blocking(move || {
            let start = writer.len();
            let written = write_chunk(&mut writer, &samples).map(|_| start);
            (writer, written)
        })
        .await?;
        self.writer = Some(writer);

        let start = written.with_context(|| format!("Failed to write chunk to {:?}", self.path))?;
        self.last_chunk_start = Some(start);

        let index = self.chunks;
        self.chunks += 1;
        Ok(index)
    }

    async fn discard_last(&mut self) -> Result<()> {
        let keep = self
            .last_chunk_start
            .ok_or_else(|| anyhow!("No chunk to discard in {:?}", self.path))?;
        let writer = self.take_writer()?;
        self.last_chunk_start = None;

        let path = self.path.clone();
        let spec = wav_spec(self.format);
        let writer = tokio::task::spawn_blocking(move || truncate_wav(&path, writer, spec, keep))
            .await?
            .with_context(|| format!("Failed to drop last chunk of {:?}", self.path))?;

        self.writer = Some(writer);
        self.chunks -= 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            tokio::task::spawn_blocking(move || writer.finalize())
                .await?
                .with_context(|| format!("Failed to finalize {:?}", self.path))?;
        }
        Ok(())
    }

    fn units_written(&self) -> u64 {
        self.chunks
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavReader;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn chunk(seq: u64, channels: u16) -> CapturedUnit {
        CapturedUnit::new(
            Payload::Audio {
                sample_rate: 16000,
                channels,
                samples: Arc::from(vec![0.25f32; 320 * channels as usize]),
            },
            seq,
            None,
            seq * 20_000_000,
            0.0,
        )
    }

    #[tokio::test]
    async fn test_chunks_land_in_wav() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mic.wav");
        let format = AudioFormat {
            sample_rate: 16000,
            channels: 1,
        };
        let mut sink = WavSink::create(&path, format).await.unwrap();

        assert_eq!(sink.write(&chunk(0, 1)).await.unwrap(), 0);
        assert_eq!(sink.write(&chunk(1, 1)).await.unwrap(), 1);
        sink.close().await.unwrap();
        sink.close().await.unwrap();

        let reader = WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.len(), 640);
    }

    #[tokio::test]
    async fn test_channel_mismatch_rejected() {
        let dir = tempdir().unwrap();
        let format = AudioFormat {
            sample_rate: 16000,
            channels: 1,
        };
        let mut sink = WavSink::create(dir.path().join("mic.wav"), format)
            .await
            .unwrap();

        assert!(sink.write(&chunk(0, 2)).await.is_err());
        assert_eq!(sink.units_written(), 0);
    }

    #[tokio::test]
    async fn test_discard_last_keeps_earlier_chunks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mic.wav");
        let format = AudioFormat {
            sample_rate: 16000,
            channels: 2,
        };
        let mut sink = WavSink::create(&path, format).await.unwrap();

        sink.write(&chunk(0, 2)).await.unwrap();
        sink.write(&chunk(1, 2)).await.unwrap();
        sink.discard_last().await.unwrap();
        assert_eq!(sink.units_written(), 1);
        assert!(sink.discard_last().await.is_err());

        assert_eq!(sink.write(&chunk(2, 2)).await.unwrap(), 1);
        sink.close().await.unwrap();

        let reader = WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.len(), 2 * 640);
    }
}
