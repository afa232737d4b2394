use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use std::path::{Path, PathBuf};
use tokio::process::Command;

use super::offset::SyncMetadata;

/// One media file plus the demuxer arguments the encoder needs to read it
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSource {
    pub path: PathBuf,
    pub input_args: Vec<String>,
}

impl MediaSource {
    /// Headerless frames as written by the raw video sink
    pub fn raw_video(
        path: impl Into<PathBuf>,
        width: u32,
        height: u32,
        pixel_format: &str,
        frame_rate: f64,
    ) -> Self {
        Self {
            path: path.into(),
            input_args: vec![
                "-f".to_string(),
                "rawvideo".to_string(),
                "-pixel_format".to_string(),
                pixel_format.to_string(),
                "-video_size".to_string(),
                format!("{}x{}", width, height),
                "-framerate".to_string(),
                format!("{:.3}", frame_rate),
            ],
        }
    }

    pub fn wav(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            input_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MuxInput {
    pub stream_id: String,
    pub source: MediaSource,
    /// Seconds this input is shifted later on the output timeline
    pub delay_seconds: f64,
}

/// Encoder invocation that aligns several streams with constant offsets
#[derive(Debug, Clone, PartialEq)]
pub struct MuxPlan {
    pub inputs: Vec<MuxInput>,
    pub output: PathBuf,
}

impl MuxPlan {
    /// The earliest-starting stream gets no delay; every other stream is
    /// delayed by how much later it started.
    pub fn from_metadata(
        metadata: &SyncMetadata,
        sources: Vec<(String, MediaSource)>,
        output: impl Into<PathBuf>,
    ) -> Result<Self> {
        if sources.is_empty() {
            return Err(anyhow!("Nothing to mux for trial {}", metadata.trial_number));
        }

        let mut offsets = Vec::with_capacity(sources.len());
        for (stream_id, _) in &sources {
            let offset = metadata.offset_of(stream_id).ok_or_else(|| {
                anyhow!(
                    "Stream {} has no offset in trial {} sync metadata",
                    stream_id,
                    metadata.trial_number
                )
            })?;
            offsets.push(offset);
        }

        let earliest = offsets.iter().copied().fold(f64::INFINITY, f64::min);
        let inputs = sources
            .into_iter()
            .zip(offsets)
            .map(|((stream_id, source), offset)| MuxInput {
                stream_id,
                source,
                delay_seconds: offset - earliest,
            })
            .collect();

        if metadata.drift_exceeds_budget {
            warn!(
                "Muxing trial {} with a single offset although the session exceeds the drift budget",
                metadata.trial_number
            );
        }

        Ok(Self {
            inputs,
            output: output.into(),
        })
    }

    pub fn ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec!["-y".to_string(), "-loglevel".to_string(), "error".to_string()];

        for input in &self.inputs {
            if input.delay_seconds > 0.0 {
                args.push("-itsoffset".to_string());
                args.push(format!("{:.6}", input.delay_seconds));
            }
            args.extend(input.source.input_args.iter().cloned());
            args.push("-i".to_string());
            args.push(input.source.path.to_string_lossy().into_owned());
        }

        for idx in 0..self.inputs.len() {
            args.push("-map".to_string());
            args.push(idx.to_string());
        }

        args.extend(
            ["-c:v", "libx264", "-pix_fmt", "yuv420p", "-c:a", "aac"]
                .iter()
                .map(|s| s.to_string()),
        );
        args.push(self.output.to_string_lossy().into_owned());
        args
    }

    pub fn delay_of(&self, stream_id: &str) -> Option<f64> {
        self.inputs
            .iter()
            .find(|i| i.stream_id == stream_id)
            .map(|i| i.delay_seconds)
    }
}

/// Runs the external encoder for a [`MuxPlan`]
pub struct Muxer {
    program: PathBuf,
}

impl Muxer {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
        }
    }

    pub fn with_program(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
        }
    }

    pub async fn run(&self, plan: &MuxPlan) -> Result<()> {
        let args = plan.ffmpeg_args();
        info!("Muxing {} inputs into {:?}", plan.inputs.len(), plan.output);

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .with_context(|| format!("Failed to spawn {:?}. Is it installed?", self.program))?;

        if !output.status.success() {
            return Err(anyhow!(
                "{:?} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        Ok(())
    }
}

impl Default for Muxer {
    fn default() -> Self {
        Self::new()
    }
}
