use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{RawVideoSink, RecordingSink, SinkFactory, WavSink};
use crate::config::AudioFormat;
use crate::core::StreamKind;
use crate::engine::session::TrialPaths;

/// Opens raw video files or WAV files depending on the stream kind
pub struct FileSinkFactory {
    audio_format: Option<AudioFormat>,
}

impl FileSinkFactory {
    pub fn new(audio_format: Option<AudioFormat>) -> Self {
        Self { audio_format }
    }
}

#[async_trait]
impl SinkFactory for FileSinkFactory {
    async fn open_recording(&self, paths: &TrialPaths) -> Result<Box<dyn RecordingSink>> {
        match paths.kind {
            StreamKind::Video => Ok(Box::new(RawVideoSink::create(&paths.media_file).await?)),
            StreamKind::Audio => {
                let format = self
                    .audio_format
                    .ok_or_else(|| anyhow!("Audio stream {} has no audio format", paths.stream_id))?;
                Ok(Box::new(WavSink::create(&paths.media_file, format).await?))
            }
        }
    }
}
