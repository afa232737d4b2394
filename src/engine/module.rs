use anyhow::{anyhow, Result};
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::router::{Router, RouterControl, RouterSummary};
use crate::buffers::FrameBuffer;
use crate::config::ModuleConfig;
use crate::core::Clock;
use crate::error::SyncError;
use crate::hal::{CaptureSource, CaptureThread};
use crate::protocol::{Command, CommandEnvelope, ErrorKind, Status, StatusMessage};
use crate::sinks::{PreviewSink, SinkFactory};

/// Pending control messages before `handle` starts waiting on the router
const CONTROL_CAPACITY: usize = 32;

/// One capture module: a capture thread feeding a router task.
///
/// Commands arrive as [`CommandEnvelope`]s and every reply or notification
/// leaves through the status receiver returned by [`SyncModule::start`].
pub struct SyncModule {
    config: ModuleConfig,
    control_tx: mpsc::Sender<RouterControl>,
    status_tx: mpsc::UnboundedSender<StatusMessage>,
    /// Parent of the capture thread's token; cancelling it also stops the router
    cancel: CancellationToken,
    capture: Option<CaptureThread>,
    router: Option<JoinHandle<RouterSummary>>,
}

impl SyncModule {
    /// Spawn the capture thread and the router task; must run inside a runtime
    pub fn start(
        config: ModuleConfig,
        source: Box<dyn CaptureSource>,
        clock: Arc<dyn Clock>,
        sinks: Box<dyn SinkFactory>,
        preview: Option<Box<dyn PreviewSink>>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<StatusMessage>)> {
        config.validate()?;
        if source.kind() != config.kind {
            return Err(SyncError::Config(format!(
                "source {} delivers {} but stream {} is configured for {}",
                source.source_id(),
                source.kind(),
                config.stream_id,
                config.kind
            ))
            .into());
        }

        let (producer, consumer) =
            FrameBuffer::with_poll_interval(config.buffer_capacity, config.poll_interval())?;
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);

        let cancel = CancellationToken::new();
        let router = Router::new(config.clone(), consumer, sinks, preview, status_tx.clone())?;
        let (capture, events) = CaptureThread::spawn_with_cancel(
            source,
            producer,
            clock,
            config.restart.clone(),
            cancel.child_token(),
        )?;
        let router = tokio::spawn(router.run(control_rx, Some(events), cancel.clone()));

        info!(
            "Module {} started for stream {} ({})",
            config.module, config.stream_id, config.kind
        );
        let _ = status_tx.send(StatusMessage::new(Status::Ready {
            module: config.module.clone(),
            stream_id: config.stream_id.clone(),
        }));

        Ok((
            Self {
                config,
                control_tx,
                status_tx,
                cancel,
                capture: Some(capture),
                router: Some(router),
            },
            status_rx,
        ))
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.router.is_some()
    }

    /// Parse and dispatch one protocol line; returns false after `quit`
    pub async fn handle_line(&mut self, line: &str) -> bool {
        match CommandEnvelope::parse(line) {
            Ok(envelope) => self.handle(envelope).await,
            Err(e) => {
                warn!("Ignoring malformed command {:?}: {}", line.trim(), e);
                self.emit(StatusMessage::error(
                    None,
                    ErrorKind::InvalidCommand,
                    e.to_string(),
                ));
                true
            }
        }
    }

    /// Dispatch one command; returns false after `quit`
    pub async fn handle(&mut self, envelope: CommandEnvelope) -> bool {
        let reply_to = Some(envelope.id);

        let control = match envelope.command {
            Command::StartRecording {
                session_dir,
                trial_number,
            } => RouterControl::StartRecording {
                reply_to,
                session_dir,
                trial_number,
            },
            Command::StopRecording => RouterControl::StopRecording { reply_to },
            Command::ApplyConfig {
                record_rate_hz,
                preview_rate_hz,
            } => RouterControl::ApplyConfig {
                reply_to,
                record_rate_hz,
                preview_rate_hz,
            },
            Command::GetStatus => RouterControl::ReportStatus { reply_to },
            Command::Quit => {
                if let Err(e) = self.shutdown().await {
                    error!("Shutdown of {} failed: {}", self.config.stream_id, e);
                }
                self.emit(StatusMessage::reply(reply_to, Status::Quitting));
                return false;
            }
        };

        if self.control_tx.send(control).await.is_err() {
            // only reachable once the router has exited
            self.emit(StatusMessage::error(
                None,
                ErrorKind::InvalidState,
                format!("module {} is shut down", self.config.stream_id),
            ));
        }
        true
    }

    /// Stop capture first so the router drains what is left and exits.
    ///
    /// Any active recording is closed by the router on its way out. Only the
    /// capture token is cancelled here; cancelling the module token would cut
    /// the drain short.
    pub async fn shutdown(&mut self) -> Result<RouterSummary> {
        let Some(router) = self.router.take() else {
            return Err(anyhow!("Module {} is already shut down", self.config.stream_id));
        };

        if let Some(mut capture) = self.capture.take() {
            if let Err(e) = capture.stop().await {
                // a panicked capture thread still closed the buffer on unwind
                error!("{}", e);
            }
        }

        let summary = router.await?;
        info!(
            "Module {} shut down after {} trial(s)",
            self.config.stream_id, summary.trials
        );
        Ok(summary)
    }

    fn emit(&self, msg: StatusMessage) {
        let _ = self.status_tx.send(msg);
    }
}

impl Drop for SyncModule {
    fn drop(&mut self) {
        // Can't await here; the router closes any recording as it exits
        self.cancel.cancel();
    }
}
