use std::f64::consts::PI;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::AudioFormat;
use crate::core::{Payload, StreamKind};
use crate::error::{Result, SyncError};
use crate::hal::traits::{CaptureSource, Delivery, SourcePoll};

/// Sine-tone microphone that delivers fixed-size chunks at real-time pace
pub struct SimulatedMicrophone {
    id: String,
    format: AudioFormat,
    frequency: f64,
    amplitude: f64,
    samples_per_chunk: usize,
    phase: f64,
    chunk_counter: u64,
    next_due: Option<Instant>,
    opened: bool,
    fail_after: Option<u64>,
}

impl SimulatedMicrophone {
    pub fn new(id: &str, format: AudioFormat) -> Self {
        Self {
            id: id.to_string(),
            format,
            frequency: 1000.0,
            amplitude: 0.5,
            samples_per_chunk: (format.sample_rate / 50).max(1) as usize,
            phase: 0.0,
            chunk_counter: 0,
            next_due: None,
            opened: false,
            fail_after: None,
        }
    }

    pub fn with_frequency(mut self, frequency: f64) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_samples_per_chunk(mut self, samples: usize) -> Self {
        self.samples_per_chunk = samples.max(1);
        self
    }

    /// Report a device error once after `chunks` deliveries
    pub fn with_failure_after(mut self, chunks: u64) -> Self {
        self.fail_after = Some(chunks);
        self
    }

    fn chunk_period(&self) -> Duration {
        Duration::from_secs_f64(self.samples_per_chunk as f64 / f64::from(self.format.sample_rate))
    }

    fn generate_samples(&mut self) -> Vec<f32> {
        let channels = usize::from(self.format.channels.max(1));
        let mut samples = Vec::with_capacity(self.samples_per_chunk * channels);
        let delta_phase = 2.0 * PI * self.frequency / f64::from(self.format.sample_rate);

        for _ in 0..self.samples_per_chunk {
            let value = (self.amplitude * self.phase.sin()) as f32;
            samples.extend(std::iter::repeat(value).take(channels));
            self.phase += delta_phase;
            if self.phase > 2.0 * PI {
                self.phase -= 2.0 * PI;
            }
        }

        samples
    }
}

impl CaptureSource for SimulatedMicrophone {
    fn source_id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> StreamKind {
        StreamKind::Audio
    }

    fn open(&mut self) -> Result<()> {
        self.opened = true;
        self.next_due = Some(Instant::now());
        Ok(())
    }

    fn next_delivery(&mut self) -> Result<SourcePoll> {
        if !self.opened {
            return Err(SyncError::Capture(format!("{} is not open", self.id)));
        }

        if self.fail_after == Some(self.chunk_counter) {
            self.fail_after = None;
            return Err(SyncError::ProducerLost {
                source_id: self.id.clone(),
                detail: "simulated device error".to_string(),
            });
        }

        let due = self.next_due.unwrap_or_else(Instant::now);
        let now = Instant::now();
        if due > now {
            thread::sleep(due - now);
        }
        self.next_due = Some(due + self.chunk_period());

        let samples = self.generate_samples();
        // hardware clock: samples delivered so far
        let sensor_time = self.chunk_counter * self.samples_per_chunk as u64 * 1_000_000_000
            / u64::from(self.format.sample_rate);
        self.chunk_counter += 1;

        Ok(SourcePoll::Unit(Delivery {
            payload: Payload::Audio {
                sample_rate: self.format.sample_rate,
                channels: self.format.channels,
                samples: Arc::from(samples),
            },
            sensor_time: Some(sensor_time),
        }))
    }

    fn close(&mut self) {
        self.opened = false;
        self.next_due = None;
    }
}
