use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, info};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::traits::{CaptureSource, SourcePoll};
use crate::buffers::FrameProducer;
use crate::core::{CapturedUnit, Clock};
use crate::resilience::RestartStrategy;

const EVENT_CAPACITY: usize = 64;
const STOP_CHECK: Duration = Duration::from_millis(10);

/// Lifecycle notices from the capture thread to the router
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    Opened { source_id: String },
    Failed { source_id: String, detail: String, attempt: u32 },
    Reopened { source_id: String },
    GaveUp { source_id: String, detail: String },
    Exhausted { source_id: String },
}

/// Dedicated OS thread that pulls units from a source into the frame buffer.
///
/// Per unit the thread only stamps and calls `try_put`; it never logs, locks,
/// or touches files. Failures travel to the async side as [`CaptureEvent`]s.
/// The thread polls its cancellation token between deliveries.
pub struct CaptureThread {
    source_id: String,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl CaptureThread {
    pub fn spawn(
        source: Box<dyn CaptureSource>,
        producer: FrameProducer,
        clock: Arc<dyn Clock>,
        restart: RestartStrategy,
    ) -> Result<(Self, Receiver<CaptureEvent>)> {
        Self::spawn_with_cancel(source, producer, clock, restart, CancellationToken::new())
    }

    /// Like [`CaptureThread::spawn`], stopping when `cancel` (or a parent of
    /// it) is cancelled
    pub fn spawn_with_cancel(
        source: Box<dyn CaptureSource>,
        producer: FrameProducer,
        clock: Arc<dyn Clock>,
        restart: RestartStrategy,
        cancel: CancellationToken,
    ) -> Result<(Self, Receiver<CaptureEvent>)> {
        let source_id = source.source_id().to_string();
        let (events_tx, events_rx) = bounded(EVENT_CAPACITY);

        let worker = CaptureWorker {
            source,
            producer,
            clock,
            restart,
            cancel: cancel.clone(),
            events: events_tx,
        };

        let handle = thread::Builder::new()
            .name(format!("capture-{}", source_id))
            .spawn(move || worker.run())?;

        info!("Capture thread started for {}", source_id);

        Ok((
            Self {
                source_id,
                cancel,
                handle: Some(handle),
            },
            events_rx,
        ))
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn request_stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map(|h| h.is_finished()).unwrap_or(true)
    }

    /// Signal the thread and wait for it without blocking the runtime
    pub async fn stop(&mut self) -> Result<()> {
        self.request_stop();

        if let Some(handle) = self.handle.take() {
            tokio::task::spawn_blocking(move || handle.join())
                .await?
                .map_err(|_| anyhow!("Capture thread for {} panicked", self.source_id))?;
            info!("Capture thread for {} stopped", self.source_id);
        }
        Ok(())
    }
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        // Can't join here; the thread exits on its next stop check
        self.request_stop();
    }
}

struct CaptureWorker {
    source: Box<dyn CaptureSource>,
    producer: FrameProducer,
    clock: Arc<dyn Clock>,
    restart: RestartStrategy,
    cancel: CancellationToken,
    events: Sender<CaptureEvent>,
}

impl CaptureWorker {
    fn run(mut self) {
        let mut sequence = 0u64;
        let mut attempt = 0u32;
        let mut needs_open = true;

        while !self.stopping() {
            if needs_open {
                match self.source.open() {
                    Ok(()) => {
                        needs_open = false;
                        let source_id = self.source_id();
                        self.emit(if attempt == 0 {
                            CaptureEvent::Opened { source_id }
                        } else {
                            CaptureEvent::Reopened { source_id }
                        });
                    }
                    Err(e) => {
                        attempt += 1;
                        if !self.back_off(attempt, e.to_string()) {
                            break;
                        }
                    }
                }
                continue;
            }

            match self.source.next_delivery() {
                Ok(SourcePoll::Unit(delivery)) => {
                    attempt = 0;
                    let unit = CapturedUnit::stamp(
                        delivery.payload,
                        sequence,
                        delivery.sensor_time,
                        self.clock.as_ref(),
                    );
                    sequence += 1;
                    self.producer.try_put(unit);
                }
                Ok(SourcePoll::Idle) => {}
                Ok(SourcePoll::Exhausted) => {
                    let source_id = self.source_id();
                    self.emit(CaptureEvent::Exhausted { source_id });
                    break;
                }
                Err(e) => {
                    self.source.close();
                    needs_open = true;
                    attempt += 1;
                    if !self.back_off(attempt, e.to_string()) {
                        break;
                    }
                }
            }
        }

        self.source.close();
        self.producer.close();
        debug!("Capture worker for {} exiting after {} units", self.source.source_id(), sequence);
    }

    /// Report the failure and wait out the restart delay; false means give up
    fn back_off(&mut self, attempt: u32, detail: String) -> bool {
        let source_id = self.source_id();
        self.emit(CaptureEvent::Failed {
            source_id: source_id.clone(),
            detail: detail.clone(),
            attempt,
        });

        match self.restart.delay_for(attempt) {
            Some(delay) => {
                self.sleep_unless_stopped(delay);
                true
            }
            None => {
                self.emit(CaptureEvent::GaveUp { source_id, detail });
                false
            }
        }
    }

    fn sleep_unless_stopped(&self, delay: Duration) {
        let mut remaining = delay;
        while !remaining.is_zero() && !self.stopping() {
            let step = remaining.min(STOP_CHECK);
            thread::sleep(step);
            remaining -= step;
        }
    }

    fn stopping(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn source_id(&self) -> String {
        self.source.source_id().to_string()
    }

    fn emit(&self, event: CaptureEvent) {
        // a full event queue drops the notice rather than stall capture
        let _ = self.events.try_send(event);
    }
}
