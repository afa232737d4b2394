use crossbeam_channel::Receiver;
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::gate::TimingGate;
use super::session::TrialPaths;
use super::state::SessionState;
use crate::buffers::FrameConsumer;
use crate::config::ModuleConfig;
use crate::core::CapturedUnit;
use crate::error::{Result, SyncError};
use crate::hal::CaptureEvent;
use crate::observability::collector::{PREVIEW, RECORD};
use crate::observability::{Metrics, MetricsMonitor, MetricsReport};
use crate::protocol::{ErrorKind, Status, StatusMessage};
use crate::sinks::{PreviewSink, RecordingSink, SinkFactory};
use crate::timing::{TimingLog, TimingLogEntry};

/// How often capture events, the watchdog, and the metrics report are checked
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_millis(50);

/// Requests handled by the router between units
#[derive(Debug, Clone, PartialEq)]
pub enum RouterControl {
    StartRecording {
        reply_to: Option<String>,
        session_dir: PathBuf,
        trial_number: u32,
    },
    StopRecording {
        reply_to: Option<String>,
    },
    ApplyConfig {
        reply_to: Option<String>,
        record_rate_hz: Option<f64>,
        preview_rate_hz: Option<f64>,
    },
    ReportStatus {
        reply_to: Option<String>,
    },
}

/// Totals returned when the router exits
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterSummary {
    pub captured: u64,
    pub recorded: u64,
    pub previewed: u64,
    pub trials: u32,
    pub dropped: u64,
}

/// Media sink and timing log of the trial being recorded
struct ActiveRecording {
    paths: TrialPaths,
    sink: Box<dyn RecordingSink>,
    log: TimingLog,
    units_written: u64,
    /// Start command still waiting for `recording_started`
    start_reply: Option<String>,
    announced: bool,
}

impl ActiveRecording {
    /// Media first, then the row. When the row can't be written the media
    /// unit is taken back, so the files never disagree on the unit count.
    async fn write(&mut self, unit: &CapturedUnit) -> Result<()> {
        let index = self
            .sink
            .write(unit)
            .await
            .map_err(|e| SyncError::write_failure(&self.paths.media_file, e))?;

        let entry = TimingLogEntry::from_unit(
            self.paths.trial_number,
            &self.paths.stream_id,
            self.paths.kind,
            unit,
            index,
        );
        if let Err(e) = self.log.write(&entry).await {
            if let Err(discard_err) = self.sink.discard_last().await {
                warn!(
                    "{:?} keeps unit {} without a timing row: {}",
                    self.paths.media_file, index, discard_err
                );
            }
            return Err(e);
        }
        self.units_written += 1;
        Ok(())
    }

    /// Close both files, keeping whatever was written
    async fn close(&mut self) -> Result<()> {
        let media = self
            .sink
            .close()
            .await
            .map_err(|e| SyncError::write_failure(&self.paths.media_file, e));
        let log = self.log.close().await;

        if let Err(e) = &media {
            error!("Failed to close media file {:?}: {}", self.paths.media_file, e);
        }
        if let Err(e) = &log {
            error!("Failed to close timing log {:?}: {}", self.paths.timing_log, e);
        }
        media.and(log)
    }
}

/// Remove the header-only log and empty media file of a trial that never
/// recorded a unit
async fn discard_unstarted(paths: &TrialPaths) {
    for path in [&paths.timing_log, &paths.media_file] {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!("Failed to remove {:?}: {}", path, e);
        }
    }
    debug!("Discarded empty trial {} of {}", paths.trial_number, paths.stream_id);
}

/// Single consumer of a module's frame buffer.
///
/// Every unit is counted as captured, then offered to the recording gate
/// (while a trial is active) and independently to the preview gate.
/// Recording always runs before preview and a preview failure never touches
/// the recording.
pub struct Router {
    config: ModuleConfig,
    consumer: FrameConsumer,
    sinks: Box<dyn SinkFactory>,
    preview: Option<Box<dyn PreviewSink>>,
    preview_enabled: bool,
    record_gate: TimingGate,
    preview_gate: TimingGate,
    metrics: Metrics,
    monitor: MetricsMonitor,
    state: SessionState,
    active: Option<ActiveRecording>,
    status_tx: mpsc::UnboundedSender<StatusMessage>,
    last_unit_at: Instant,
    /// Capture-clock time of the latest unit, paired with `last_unit_at`
    last_monotonic_ns: Option<u64>,
    last_report_at: Instant,
    producer_lost: bool,
    summary: RouterSummary,
}

impl Router {
    pub fn new(
        config: ModuleConfig,
        consumer: FrameConsumer,
        sinks: Box<dyn SinkFactory>,
        preview: Option<Box<dyn PreviewSink>>,
        status_tx: mpsc::UnboundedSender<StatusMessage>,
    ) -> Result<Self> {
        config.validate()?;

        let record_gate = TimingGate::from_rate(config.record_rate_hz, config.gate_tolerance)?;
        let preview_gate = TimingGate::from_rate(config.preview_rate_hz, config.gate_tolerance)?;
        let preview_enabled = config.preview_enabled && preview.is_some();
        let metrics = Metrics::new(config.metrics_window);
        let monitor = MetricsMonitor::new(&config.stream_id);
        let now = Instant::now();

        Ok(Self {
            config,
            consumer,
            sinks,
            preview,
            preview_enabled,
            record_gate,
            preview_gate,
            metrics,
            monitor,
            state: SessionState::Idle,
            active: None,
            status_tx,
            last_unit_at: now,
            last_monotonic_ns: None,
            last_report_at: now,
            producer_lost: false,
            summary: RouterSummary::default(),
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    pub fn preview_enabled(&self) -> bool {
        self.preview_enabled
    }

    pub fn record_gate(&self) -> &TimingGate {
        &self.record_gate
    }

    pub fn preview_gate(&self) -> &TimingGate {
        &self.preview_gate
    }

    pub fn summary(&self) -> &RouterSummary {
        &self.summary
    }

    pub fn metrics_report(&mut self) -> MetricsReport {
        self.metrics.set_drop_stats(self.consumer.drop_stats());
        match self.last_monotonic_ns {
            Some(last) => {
                let now = last + self.last_unit_at.elapsed().as_nanos() as u64;
                self.metrics.get_report_at(now)
            }
            None => self.metrics.get_report(),
        }
    }

    /// Drain the buffer until the producer closes it or `cancel` fires.
    ///
    /// Either way an active recording is closed before the summary is
    /// returned.
    pub async fn run(
        mut self,
        mut control_rx: mpsc::Receiver<RouterControl>,
        events: Option<Receiver<CaptureEvent>>,
        cancel: CancellationToken,
    ) -> RouterSummary {
        let mut housekeeping = tokio::time::interval(HOUSEKEEPING_INTERVAL);
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut control_open = true;

        self.last_unit_at = Instant::now();
        self.last_report_at = Instant::now();
        info!("Router for {} running", self.config.stream_id);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Router for {} cancelled", self.config.stream_id);
                    break;
                }
                msg = control_rx.recv(), if control_open => match msg {
                    Some(msg) => self.handle_control(msg).await,
                    None => control_open = false,
                },
                unit = self.consumer.recv() => match unit {
                    Some(unit) => self.route(unit).await,
                    None => break,
                },
                _ = housekeeping.tick() => self.housekeeping(events.as_ref()).await,
            }
        }

        // control messages queued before the buffer closed still get answers
        while let Ok(msg) = control_rx.try_recv() {
            self.handle_control(msg).await;
        }

        self.finish(events.as_ref()).await
    }

    /// Route one unit through recording and preview
    pub async fn route(&mut self, unit: CapturedUnit) {
        self.last_unit_at = Instant::now();
        self.last_monotonic_ns = Some(unit.monotonic_time);
        if self.producer_lost {
            self.producer_lost = false;
            info!("Producer for {} is delivering again", self.config.stream_id);
        }

        self.metrics.update_capture(&unit);
        self.summary.captured += 1;

        if self.active.is_some() && self.record_gate.should_accept(&unit) {
            self.record(&unit).await;
        }

        if self.preview_enabled && self.preview_gate.should_accept(&unit) {
            self.present(unit).await;
        }
    }

    pub async fn handle_control(&mut self, msg: RouterControl) {
        match msg {
            RouterControl::StartRecording {
                reply_to,
                session_dir,
                trial_number,
            } => self.start_recording(reply_to, session_dir, trial_number).await,
            RouterControl::StopRecording { reply_to } => self.stop_recording(reply_to).await,
            RouterControl::ApplyConfig {
                reply_to,
                record_rate_hz,
                preview_rate_hz,
            } => self.apply_config(reply_to, record_rate_hz, preview_rate_hz),
            RouterControl::ReportStatus { reply_to } => self.report_status(reply_to),
        }
    }

    /// Drain capture events, run the watchdog, and publish metrics when due
    pub async fn housekeeping(&mut self, events: Option<&Receiver<CaptureEvent>>) {
        if let Some(events) = events {
            while let Ok(event) = events.try_recv() {
                self.handle_capture_event(event).await;
            }
        }

        if !self.producer_lost && self.last_unit_at.elapsed() >= self.config.producer_timeout() {
            let detail = format!(
                "no unit received for {} ms",
                self.last_unit_at.elapsed().as_millis()
            );
            self.on_producer_lost(detail).await;
        }

        if self.last_report_at.elapsed() >= self.config.report_interval() {
            self.last_report_at = Instant::now();
            self.publish_metrics();
        }
    }

    async fn start_recording(
        &mut self,
        reply_to: Option<String>,
        session_dir: PathBuf,
        trial_number: u32,
    ) {
        if let Some(active) = &self.active {
            let detail = format!(
                "already recording trial {}",
                active.paths.trial_number
            );
            self.emit(StatusMessage::error(reply_to, ErrorKind::InvalidState, detail));
            return;
        }

        if self.producer_lost {
            let err = SyncError::ProducerLost {
                source_id: self.config.stream_id.clone(),
                detail: "no units arriving".to_string(),
            };
            self.emit(StatusMessage::reply(
                reply_to,
                Status::DeviceError {
                    detail: err.to_string(),
                },
            ));
            return;
        }

        let paths = TrialPaths::new(session_dir, trial_number, &self.config.stream_id, self.config.kind);
        match self.open_recording(&paths).await {
            Ok((sink, log)) => {
                if matches!(self.state, SessionState::Error { .. }) {
                    self.transition(SessionState::Idle);
                }
                self.transition(SessionState::Recording {
                    trial_number,
                    started_at: Some(Instant::now()),
                    units_written: 0,
                });

                self.record_gate.reset();
                // a preview disabled by an earlier failure gets another chance
                self.preview_enabled = self.config.preview_enabled && self.preview.is_some();
                self.summary.trials += 1;

                info!(
                    "Recording trial {} of {} to {:?}",
                    trial_number, self.config.stream_id, paths.media_file
                );

                self.active = Some(ActiveRecording {
                    paths,
                    sink,
                    log,
                    units_written: 0,
                    start_reply: reply_to,
                    announced: false,
                });
            }
            Err(e) => {
                error!("Cannot start trial {}: {}", trial_number, e);
                self.emit(StatusMessage::error(reply_to, e.kind(), e.to_string()));
            }
        }
    }

    async fn open_recording(
        &mut self,
        paths: &TrialPaths,
    ) -> Result<(Box<dyn RecordingSink>, TimingLog)> {
        paths.prepare().await?;

        let mut sink = self
            .sinks
            .open_recording(paths)
            .await
            .map_err(|e| SyncError::write_failure(&paths.media_file, e))?;

        match TimingLog::with_flush_rows(&paths.timing_log, paths.kind, self.config.log_flush_rows)
            .await
        {
            Ok(log) => Ok((sink, log)),
            Err(e) => {
                if let Err(close_err) = sink.close().await {
                    warn!("Failed to close {:?}: {}", paths.media_file, close_err);
                }
                Err(e)
            }
        }
    }

    async fn stop_recording(&mut self, reply_to: Option<String>) {
        let Some(mut active) = self.active.take() else {
            self.emit(StatusMessage::error(
                reply_to,
                ErrorKind::InvalidState,
                "no recording in progress",
            ));
            return;
        };

        let trial_number = active.paths.trial_number;
        self.transition(SessionState::Stopping { trial_number });

        let closed = active.close().await;
        let errored = closed.is_err();
        if let Err(e) = closed {
            self.emit(StatusMessage::error(reply_to.clone(), e.kind(), e.to_string()));
            self.transition(SessionState::Error {
                error_msg: e.to_string(),
                recoverable: true,
            });
        } else {
            self.transition(SessionState::Idle);
        }

        info!(
            "Stopped trial {} of {} after {} units",
            trial_number, self.config.stream_id, active.units_written
        );
        self.emit(StatusMessage::reply(
            reply_to,
            Status::RecordingStopped {
                trial_number,
                frame_count: active.units_written,
                errored,
            },
        ));
    }

    /// Validate both rates before touching either gate
    fn apply_config(
        &mut self,
        reply_to: Option<String>,
        record_rate_hz: Option<f64>,
        preview_rate_hz: Option<f64>,
    ) {
        let mut record_gate = self.record_gate.clone();
        let mut preview_gate = self.preview_gate.clone();

        let applied = record_rate_hz
            .map(|rate| record_gate.set_target_rate(Some(rate)))
            .transpose()
            .and_then(|_| {
                preview_rate_hz
                    .map(|rate| preview_gate.set_target_rate(Some(rate)))
                    .transpose()
            });

        if let Err(e) = applied {
            warn!("Rejected config for {}: {}", self.config.stream_id, e);
            self.emit(StatusMessage::error(reply_to, e.kind(), e.to_string()));
            return;
        }

        self.record_gate = record_gate;
        self.preview_gate = preview_gate;
        self.config.record_rate_hz = self.record_gate.target_rate_hz();
        self.config.preview_rate_hz = self.preview_gate.target_rate_hz();

        info!(
            "Applied rates for {}: record {:?} Hz, preview {:?} Hz",
            self.config.stream_id, self.config.record_rate_hz, self.config.preview_rate_hz
        );
        self.emit(StatusMessage::reply(
            reply_to,
            Status::ConfigApplied {
                record_rate_hz: self.config.record_rate_hz,
                preview_rate_hz: self.config.preview_rate_hz,
            },
        ));
    }

    fn report_status(&mut self, reply_to: Option<String>) {
        let metrics = self.metrics_report();
        self.emit(StatusMessage::reply(
            reply_to,
            Status::StatusReport {
                state: self.state.name().to_string(),
                trial_number: self.active.as_ref().map(|a| a.paths.trial_number),
                preview_enabled: self.preview_enabled,
                metrics,
            },
        ));
    }

    async fn record(&mut self, unit: &CapturedUnit) {
        let Some(active) = self.active.as_mut() else {
            return;
        };

        if let Err(e) = active.write(unit).await {
            error!(
                "Recording write failed for {} trial {}: {}",
                self.config.stream_id, active.paths.trial_number, e
            );
            self.metrics.record_error(RECORD);
            self.fail_recording(e).await;
            return;
        }

        let units_written = active.units_written;
        let announce = if active.announced {
            None
        } else {
            active.announced = true;
            Some((
                active.start_reply.take(),
                Status::RecordingStarted {
                    trial_number: active.paths.trial_number,
                    timing_log: active.paths.timing_log.clone(),
                    media_file: active.paths.media_file.clone(),
                },
            ))
        };

        self.metrics.update_accept(RECORD, unit);
        self.summary.recorded += 1;
        if let SessionState::Recording {
            units_written: written,
            ..
        } = &mut self.state
        {
            *written = units_written;
        }

        if let Some((reply_to, status)) = announce {
            self.emit(StatusMessage::reply(reply_to, status));
        }
    }

    async fn present(&mut self, unit: CapturedUnit) {
        let Some(preview) = self.preview.as_mut() else {
            return;
        };

        match preview.present(unit.clone()).await {
            Ok(()) => {
                self.metrics.update_accept(PREVIEW, &unit);
                self.summary.previewed += 1;
            }
            Err(e) => {
                warn!("Preview for {} failed, disabling: {}", self.config.stream_id, e);
                self.preview_enabled = false;
                self.metrics.record_error(PREVIEW);
                self.emit(StatusMessage::error(
                    None,
                    ErrorKind::PreviewFailure,
                    e.to_string(),
                ));
            }
        }
    }

    /// Close the trial after a write failure; partial files stay on disk
    async fn fail_recording(&mut self, err: SyncError) {
        let Some(mut active) = self.active.take() else {
            return;
        };

        let trial_number = active.paths.trial_number;
        self.transition(SessionState::Error {
            error_msg: err.to_string(),
            recoverable: true,
        });
        // the failure is already reported; close errors are only logged
        let _ = active.close().await;

        let reply_to = active.start_reply.take();
        self.emit(StatusMessage::error(reply_to.clone(), err.kind(), err.to_string()));
        self.emit(StatusMessage::reply(
            reply_to,
            Status::RecordingStopped {
                trial_number,
                frame_count: active.units_written,
                errored: true,
            },
        ));
    }

    /// Source silent or gone: end any trial cleanly and tell the controller once
    async fn on_producer_lost(&mut self, detail: String) {
        self.producer_lost = true;
        let err = SyncError::ProducerLost {
            source_id: self.config.stream_id.clone(),
            detail,
        };
        warn!("{}", err);

        let Some(mut active) = self.active.take() else {
            self.emit(StatusMessage::new(Status::DeviceError {
                detail: err.to_string(),
            }));
            return;
        };

        let trial_number = active.paths.trial_number;
        let reply_to = active.start_reply.take();
        self.emit(StatusMessage::reply(
            reply_to.clone(),
            Status::DeviceError {
                detail: err.to_string(),
            },
        ));

        self.transition(SessionState::Stopping { trial_number });
        let closed = active.close().await;

        if !active.announced {
            // the start never got recording_started; device_error is its only answer
            discard_unstarted(&active.paths).await;
            self.summary.trials = self.summary.trials.saturating_sub(1);
            self.transition(SessionState::Idle);
            return;
        }

        match closed {
            Ok(()) => self.transition(SessionState::Idle),
            Err(e) => self.transition(SessionState::Error {
                error_msg: e.to_string(),
                recoverable: true,
            }),
        };

        self.emit(StatusMessage::reply(
            reply_to,
            Status::RecordingStopped {
                trial_number,
                frame_count: active.units_written,
                errored: true,
            },
        ));
    }

    async fn handle_capture_event(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::Opened { source_id } => debug!("Source {} opened", source_id),
            CaptureEvent::Reopened { source_id } => info!("Source {} reopened", source_id),
            CaptureEvent::Failed {
                source_id,
                detail,
                attempt,
            } => {
                warn!("Source {} failed (attempt {}): {}", source_id, attempt, detail);
                self.emit(StatusMessage::new(Status::DeviceError {
                    detail: format!("{}: {} (attempt {})", source_id, detail, attempt),
                }));
            }
            CaptureEvent::GaveUp { source_id, detail } => {
                error!("Giving up on source {}: {}", source_id, detail);
                if !self.producer_lost {
                    self.on_producer_lost(format!("{} gave up: {}", source_id, detail))
                        .await;
                }
            }
            CaptureEvent::Exhausted { source_id } => info!("Source {} has no more data", source_id),
        }
    }

    fn publish_metrics(&mut self) {
        let report = self.metrics_report();
        info!("{}", self.monitor.generate_report(&report));
        self.emit(StatusMessage::new(Status::Metrics { report }));
    }

    async fn finish(mut self, events: Option<&Receiver<CaptureEvent>>) -> RouterSummary {
        if let Some(events) = events {
            while let Ok(event) = events.try_recv() {
                self.handle_capture_event(event).await;
            }
        }

        if let Some(mut active) = self.active.take() {
            let trial_number = active.paths.trial_number;
            self.transition(SessionState::Stopping { trial_number });
            let errored = active.close().await.is_err();
            self.transition(SessionState::Idle);

            let reply_to = active.start_reply.take();
            self.emit(StatusMessage::reply(
                reply_to,
                Status::RecordingStopped {
                    trial_number,
                    frame_count: active.units_written,
                    errored,
                },
            ));
        }

        let drops = self.consumer.drop_stats();
        self.summary.dropped = drops.dropped;
        info!(
            "Router for {} finished: {} captured, {} recorded, {} previewed, {} dropped",
            self.config.stream_id,
            self.summary.captured,
            self.summary.recorded,
            self.summary.previewed,
            self.summary.dropped
        );
        self.summary
    }

    fn transition(&mut self, target: SessionState) {
        if self.state.can_transition_to(&target) {
            debug!("{}: {} -> {}", self.config.stream_id, self.state.name(), target.name());
            self.state = target;
        } else {
            warn!(
                "{}: ignoring transition {} -> {}",
                self.config.stream_id,
                self.state.name(),
                target.name()
            );
        }
    }

    fn emit(&self, msg: StatusMessage) {
        if self.status_tx.send(msg).is_err() {
            debug!("Status receiver for {} is gone", self.config.stream_id);
        }
    }
}
