use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::Clock;

/// Kind of media a stream carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    pub fn name(&self) -> &'static str {
        match self {
            StreamKind::Video => "video",
            StreamKind::Audio => "audio",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Captured sensor data. Buffers are immutable once stamped, so clones handed
/// to several consumers never alias mutable memory.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Video {
        width: u32,
        height: u32,
        data: Arc<[u8]>,
    },
    Audio {
        sample_rate: u32,
        channels: u16,
        /// Interleaved samples
        samples: Arc<[f32]>,
    },
    Bytes(Arc<[u8]>),
}

impl Payload {
    /// Number of per-channel samples for audio, 1 for everything else
    pub fn sample_count(&self) -> u64 {
        match self {
            Payload::Audio {
                channels, samples, ..
            } => samples.len() as u64 / u64::from((*channels).max(1)),
            _ => 1,
        }
    }

    pub fn byte_len(&self) -> usize {
        match self {
            Payload::Video { data, .. } => data.len(),
            Payload::Audio { samples, .. } => samples.len() * std::mem::size_of::<f32>(),
            Payload::Bytes(data) => data.len(),
        }
    }
}

/// One timestamped frame or audio chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedUnit {
    pub payload: Payload,

    /// Producer-assigned, strictly increasing per producer session
    pub sequence_number: u64,

    /// Hardware timestamp in nanoseconds, when the source exposes one
    pub sensor_time: Option<u64>,

    /// Receipt time in nanoseconds since the module clock origin
    pub monotonic_time: u64,

    /// Receipt time as Unix seconds
    pub wall_time: f64,
}

impl CapturedUnit {
    pub fn new(
        payload: Payload,
        sequence_number: u64,
        sensor_time: Option<u64>,
        monotonic_time: u64,
        wall_time: f64,
    ) -> Self {
        Self {
            payload,
            sequence_number,
            sensor_time,
            monotonic_time,
            wall_time,
        }
    }

    /// Stamp a hardware delivery with the clock's current receipt times
    pub fn stamp(
        payload: Payload,
        sequence_number: u64,
        sensor_time: Option<u64>,
        clock: &dyn Clock,
    ) -> Self {
        Self::new(
            payload,
            sequence_number,
            sensor_time,
            clock.monotonic_ns(),
            clock.wall_time(),
        )
    }

    /// Monotonic time in seconds
    pub fn monotonic_secs(&self) -> f64 {
        self.monotonic_time as f64 / 1e9
    }
}
