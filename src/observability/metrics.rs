use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Arrival times kept for rate and jitter estimates
pub const DEFAULT_WINDOW: usize = 60;

/// Point-in-time view of one counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamReport {
    pub name: String,
    pub count: u64,
    pub rate_hz: f64,
    pub jitter_ms: f64,
    pub errors: u64,
}

/// Counter plus a rolling window of the most recent arrival times.
///
/// Rates come from the window only, so a stall shows up within a window's
/// worth of units instead of being averaged away.
#[derive(Debug, Clone)]
pub struct StreamMetrics {
    name: String,
    count: u64,
    errors: u64,
    window: VecDeque<u64>,
    window_size: usize,
}

impl StreamMetrics {
    pub fn new(name: impl Into<String>, window_size: usize) -> Self {
        let window_size = window_size.max(2);
        Self {
            name: name.into(),
            count: 0,
            errors: 0,
            window: VecDeque::with_capacity(window_size),
            window_size,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn errors(&self) -> u64 {
        self.errors
    }

    pub fn record(&mut self, monotonic_ns: u64) {
        self.count += 1;
        if self.window.len() == self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(monotonic_ns);
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    /// Units per second across the window
    pub fn rate_hz(&self) -> f64 {
        let (Some(first), Some(last)) = (self.window.front(), self.window.back()) else {
            return 0.0;
        };
        let span_ns = last.saturating_sub(*first);
        if self.window.len() < 2 || span_ns == 0 {
            return 0.0;
        }
        (self.window.len() - 1) as f64 * 1e9 / span_ns as f64
    }

    /// Rate as seen at `now_ns` on the same clock as the arrivals.
    ///
    /// Once the gap since the last arrival exceeds the mean interval, the gap
    /// counts toward the span, so a stalled stream decays toward zero instead
    /// of repeating its last rate.
    pub fn rate_hz_at(&self, now_ns: u64) -> f64 {
        let (Some(first), Some(last)) = (self.window.front(), self.window.back()) else {
            return 0.0;
        };
        let span_ns = last.saturating_sub(*first);
        if self.window.len() < 2 || span_ns == 0 {
            return 0.0;
        }

        let intervals = (self.window.len() - 1) as f64;
        let mean_interval_ns = span_ns as f64 / intervals;
        let idle_ns = now_ns.saturating_sub(*last) as f64;
        if idle_ns <= mean_interval_ns {
            return intervals * 1e9 / span_ns as f64;
        }
        intervals * 1e9 / (span_ns as f64 + idle_ns)
    }

    /// Standard deviation of inter-arrival intervals in milliseconds
    pub fn jitter_ms(&self) -> f64 {
        if self.window.len() < 3 {
            return 0.0;
        }

        let intervals: Vec<f64> = self
            .window
            .iter()
            .zip(self.window.iter().skip(1))
            .map(|(a, b)| b.saturating_sub(*a) as f64 / 1e6)
            .collect();

        let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
        let variance =
            intervals.iter().map(|i| (i - mean).powi(2)).sum::<f64>() / intervals.len() as f64;
        variance.sqrt()
    }

    pub fn snapshot(&self) -> StreamReport {
        StreamReport {
            name: self.name.clone(),
            count: self.count,
            rate_hz: self.rate_hz(),
            jitter_ms: self.jitter_ms(),
            errors: self.errors,
        }
    }

    pub fn snapshot_at(&self, now_ns: u64) -> StreamReport {
        StreamReport {
            rate_hz: self.rate_hz_at(now_ns),
            ..self.snapshot()
        }
    }
}
