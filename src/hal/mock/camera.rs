use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::core::{Payload, StreamKind};
use crate::error::{Result, SyncError};
use crate::hal::traits::{CaptureSource, Delivery, SourcePoll};

/// Longest single wait inside `next_delivery` while stalled
const STALL_SLICE: Duration = Duration::from_millis(20);

/// Paced test-pattern camera.
///
/// Frames are a single gray level that steps with every frame. The camera can
/// be told to fail or to go silent after a number of frames.
pub struct SimulatedCamera {
    id: String,
    width: u32,
    height: u32,
    frame_rate: f64,
    frame_counter: u64,
    next_due: Option<Instant>,
    opened: bool,
    fail_after: Option<u64>,
    stall_after: Option<u64>,
}

impl SimulatedCamera {
    pub fn new(id: &str, width: u32, height: u32, frame_rate: f64) -> Self {
        Self {
            id: id.to_string(),
            width,
            height,
            frame_rate: if frame_rate > 0.0 { frame_rate } else { 30.0 },
            frame_counter: 0,
            next_due: None,
            opened: false,
            fail_after: None,
            stall_after: None,
        }
    }

    /// Report a device error once after `frames` deliveries
    pub fn with_failure_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }

    /// Stop delivering (without erroring) after `frames` deliveries
    pub fn with_stall_after(mut self, frames: u64) -> Self {
        self.stall_after = Some(frames);
        self
    }

    fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate)
    }

    fn pattern(&self) -> Arc<[u8]> {
        let level = (self.frame_counter % 256) as u8;
        let len = self.width as usize * self.height as usize;
        Arc::from(vec![level; len])
    }
}

impl CaptureSource for SimulatedCamera {
    fn source_id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> StreamKind {
        StreamKind::Video
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

        if self.stall_after.is_some_and(|n| self.frame_counter >= n) {
            thread::sleep(STALL_SLICE);
            return Ok(SourcePoll::Idle);
        }

        if self.fail_after == Some(self.frame_counter) {
            self.fail_after = None;
            return Err(SyncError::ProducerLost {
                source_id: self.id.clone(),
                detail: "simulated camera disconnect".to_string(),
            });
        }

        let due = self.next_due.unwrap_or_else(Instant::now);
        let now = Instant::now();
        if due > now {
            thread::sleep(due - now);
        }
        self.next_due = Some(due + self.frame_period());

        let payload = Payload::Video {
            width: self.width,
            height: self.height,
            data: self.pattern(),
        };
        let sensor_time = (self.frame_counter as f64 * 1e9 / self.frame_rate) as u64;
        self.frame_counter += 1;

        Ok(SourcePoll::Unit(Delivery {
            payload,
            sensor_time: Some(sensor_time),
        }))
    }

    fn close(&mut self) {
        self.opened = false;
        self.next_due = None;
    }
}
