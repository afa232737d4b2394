//! Column layout of the per-stream timing logs.
//!
//! Headers and numeric precision are a file-format contract with downstream
//! tooling: columns are never renamed or reordered.

use crate::core::{CapturedUnit, StreamKind};

pub const VIDEO_HEADER: &[&str] = &[
    "trial",
    "stream",
    "wall_time",
    "monotonic_time",
    "sequence",
    "frame_index",
    "sensor_time_ns",
];

pub const AUDIO_HEADER: &[&str] = &[
    "trial",
    "stream",
    "wall_time",
    "monotonic_time",
    "sequence",
    "chunk_index",
    "sample_count",
    "sensor_time_ns",
];

/// Decimal places of the Unix wall-clock column
pub const WALL_TIME_DECIMALS: usize = 6;

/// Decimal places of the monotonic seconds column
pub const MONOTONIC_DECIMALS: usize = 9;

pub fn header_for(kind: StreamKind) -> &'static [&'static str] {
    match kind {
        StreamKind::Video => VIDEO_HEADER,
        StreamKind::Audio => AUDIO_HEADER,
    }
}

pub fn header_line(kind: StreamKind) -> String {
    header_for(kind).join(",")
}

/// Identify a stream kind from a header line
pub fn kind_for_header(line: &str) -> Option<StreamKind> {
    let line = line.trim_end_matches(['\r', '\n']);
    [StreamKind::Video, StreamKind::Audio]
        .into_iter()
        .find(|kind| header_line(*kind) == line)
}

/// Stream-specific columns of a timing row
#[derive(Debug, Clone, PartialEq)]
pub enum EntryExtra {
    Video {
        frame_index: u64,
        sensor_time_ns: Option<u64>,
    },
    Audio {
        chunk_index: u64,
        sample_count: u64,
        sensor_time_ns: Option<u64>,
    },
}

/// One timing-log row
#[derive(Debug, Clone, PartialEq)]
pub struct TimingLogEntry {
    pub trial_number: u32,
    pub stream_id: String,
    pub wall_time: f64,
    pub monotonic_ns: u64,
    pub sequence: u64,
    pub extra: EntryExtra,
}

impl TimingLogEntry {
    /// Row for a unit that landed at `media_index` in the stream's media file
    pub fn from_unit(
        trial_number: u32,
        stream_id: &str,
        kind: StreamKind,
        unit: &CapturedUnit,
        media_index: u64,
    ) -> Self {
        let extra = match kind {
            StreamKind::Video => EntryExtra::Video {
                frame_index: media_index,
                sensor_time_ns: unit.sensor_time,
            },
            StreamKind::Audio => EntryExtra::Audio {
                chunk_index: media_index,
                sample_count: unit.payload.sample_count(),
                sensor_time_ns: unit.sensor_time,
            },
        };

        Self {
            trial_number,
            stream_id: stream_id.to_string(),
            wall_time: unit.wall_time,
            monotonic_ns: unit.monotonic_time,
            sequence: unit.sequence_number,
            extra,
        }
    }

    pub fn kind(&self) -> StreamKind {
        match self.extra {
            EntryExtra::Video { .. } => StreamKind::Video,
            EntryExtra::Audio { .. } => StreamKind::Audio,
        }
    }

    /// Render the row without a trailing newline
    pub fn to_row(&self) -> String {
        let common = format!(
            "{},{},{},{},{}",
            self.trial_number,
            self.stream_id,
            format_wall_time(self.wall_time),
            format_monotonic(self.monotonic_ns),
            self.sequence
        );

        match &self.extra {
            EntryExtra::Video {
                frame_index,
                sensor_time_ns,
            } => format!("{},{},{}", common, frame_index, format_optional(*sensor_time_ns)),
            EntryExtra::Audio {
                chunk_index,
                sample_count,
                sensor_time_ns,
            } => format!(
                "{},{},{},{}",
                common,
                chunk_index,
                sample_count,
                format_optional(*sensor_time_ns)
            ),
        }
    }
}

pub fn format_wall_time(wall_time: f64) -> String {
    format!("{:.*}", WALL_TIME_DECIMALS, wall_time)
}

/// Integer arithmetic keeps all nine digits exact
pub fn format_monotonic(ns: u64) -> String {
    format!("{}.{:09}", ns / 1_000_000_000, ns % 1_000_000_000)
}

fn format_optional(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_detection() {
        assert_eq!(
            kind_for_header("trial,stream,wall_time,monotonic_time,sequence,frame_index,sensor_time_ns\n"),
            Some(StreamKind::Video)
        );
        assert_eq!(kind_for_header(&header_line(StreamKind::Audio)), Some(StreamKind::Audio));
        assert_eq!(kind_for_header("time,frame"), None);
    }

    #[test]
    fn test_fixed_precision() {
        assert_eq!(format_wall_time(1000.05), "1000.050000");
        assert_eq!(format_monotonic(1_500_000_001), "1.500000001");
        assert_eq!(format_monotonic(42), "0.000000042");
    }

    #[test]
    fn test_video_row_with_absent_sensor_time() {
        let entry = TimingLogEntry {
            trial_number: 3,
            stream_id: "cam0".to_string(),
            wall_time: 1700000000.25,
            monotonic_ns: 2_000_000_000,
            sequence: 17,
            extra: EntryExtra::Video {
                frame_index: 5,
                sensor_time_ns: None,
            },
        };
        assert_eq!(entry.to_row(), "3,cam0,1700000000.250000,2.000000000,17,5,");
    }
}
