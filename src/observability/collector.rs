use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::metrics::{StreamMetrics, StreamReport, DEFAULT_WINDOW};
use crate::buffers::DropStats;
use crate::core::CapturedUnit;

/// Counter name for units taken out of the frame buffer
pub const CAPTURED: &str = "captured";
/// Counter name for units forwarded to the recording consumer
pub const RECORD: &str = "record";
/// Counter name for units forwarded to the preview consumer
pub const PREVIEW: &str = "preview";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub captured: StreamReport,
    pub streams: BTreeMap<String, StreamReport>,
    pub dropped: u64,
    pub last_dropped_sequence: Option<u64>,
}

impl MetricsReport {
    pub fn stream(&self, name: &str) -> Option<&StreamReport> {
        self.streams.get(name)
    }
}

/// Rate, jitter, and drop accounting for one module
pub struct Metrics {
    window_size: usize,
    captured: StreamMetrics,
    streams: BTreeMap<String, StreamMetrics>,
    drops: DropStats,
}

impl Metrics {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size,
            captured: StreamMetrics::new(CAPTURED, window_size),
            streams: BTreeMap::new(),
            drops: DropStats::default(),
        }
    }

    pub fn update_capture(&mut self, unit: &CapturedUnit) {
        self.captured.record(unit.monotonic_time);
    }

    pub fn update_accept(&mut self, stream_name: &str, unit: &CapturedUnit) {
        self.stream_mut(stream_name).record(unit.monotonic_time);
    }

    pub fn record_error(&mut self, stream_name: &str) {
        self.stream_mut(stream_name).record_error();
    }

    pub fn set_drop_stats(&mut self, drops: DropStats) {
        self.drops = drops;
    }

    pub fn captured_count(&self) -> u64 {
        self.captured.count()
    }

    pub fn accepted_count(&self, stream_name: &str) -> u64 {
        self.streams.get(stream_name).map(|s| s.count()).unwrap_or(0)
    }

    pub fn get_report(&self) -> MetricsReport {
        self.build_report(StreamMetrics::snapshot)
    }

    /// Report with rates evaluated at `now_ns`, so stalled streams read low
    pub fn get_report_at(&self, now_ns: u64) -> MetricsReport {
        self.build_report(|metrics| metrics.snapshot_at(now_ns))
    }

    fn build_report(&self, snapshot: impl Fn(&StreamMetrics) -> StreamReport) -> MetricsReport {
        MetricsReport {
            captured: snapshot(&self.captured),
            streams: self
                .streams
                .iter()
                .map(|(name, metrics)| (name.clone(), snapshot(metrics)))
                .collect(),
            dropped: self.drops.dropped,
            last_dropped_sequence: self.drops.last_dropped_sequence,
        }
    }

    fn stream_mut(&mut self, stream_name: &str) -> &mut StreamMetrics {
        let window_size = self.window_size;
        self.streams
            .entry(stream_name.to_string())
            .or_insert_with(|| StreamMetrics::new(stream_name, window_size))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}
