use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Source of receipt timestamps shared by every stream of a module
pub trait Clock: Send + Sync {
    /// Nanoseconds since the clock origin; never regresses
    fn monotonic_ns(&self) -> u64;

    /// Unix time in seconds
    fn wall_time(&self) -> f64;
}

/// Production clock: `Instant` for monotonic time, `SystemTime` for wall time
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn monotonic_ns(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }

    fn wall_time(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// Hand-driven clock for deterministic tests and replays.
///
/// Wall time is derived as `wall_origin + monotonic`, so both clocks advance
/// together.
pub struct ManualClock {
    monotonic_ns: AtomicU64,
    wall_origin_us: u64,
}

impl ManualClock {
    pub fn new(wall_origin: f64) -> Self {
        Self {
            monotonic_ns: AtomicU64::new(0),
            wall_origin_us: (wall_origin * 1e6).round() as u64,
        }
    }

    pub fn set_ns(&self, ns: u64) {
        self.monotonic_ns.fetch_max(ns, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.monotonic_ns.fetch_add(ms * 1_000_000, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn monotonic_ns(&self) -> u64 {
        self.monotonic_ns.load(Ordering::SeqCst)
    }

    fn wall_time(&self) -> f64 {
        self.wall_origin_us as f64 / 1e6 + self.monotonic_ns() as f64 / 1e9
    }
}
