//! Capture module process.
//!
//! Reads JSON commands from stdin, writes JSON status lines to stdout, and
//! logs to stderr. The first argument is an optional module config file.

use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use synclogger::config::{KnownDevices, ModuleConfig};
use synclogger::core::{StreamKind, SystemClock};
use synclogger::engine::SyncModule;
use synclogger::hal::mock::{SimulatedCamera, SimulatedMicrophone};
use synclogger::hal::CaptureSource;
use synclogger::protocol::Status;
use synclogger::sinks::{FileSinkFactory, WatchPreview};

fn simulated_source(config: &ModuleConfig) -> Result<Box<dyn CaptureSource>> {
    match config.kind {
        StreamKind::Video => {
            let video = config
                .video
                .as_ref()
                .ok_or_else(|| anyhow!("Video stream {} has no video format", config.stream_id))?;
            // deliver faster than recorded so the gate has something to thin out
            let frame_rate = config.record_rate_hz.map(|r| r * 2.0).unwrap_or(30.0);
            Ok(Box::new(SimulatedCamera::new(
                &config.stream_id,
                video.width,
                video.height,
                frame_rate,
            )))
        }
        StreamKind::Audio => {
            let format = config
                .audio
                .ok_or_else(|| anyhow!("Audio stream {} has no audio format", config.stream_id))?;
            Ok(Box::new(SimulatedMicrophone::new(&config.stream_id, format)))
        }
    }
}

async fn load_config() -> Result<ModuleConfig> {
    let mut config = match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading module config from {}", path);
            ModuleConfig::load(&path).await?
        }
        None => ModuleConfig::default(),
    };

    if let (Some(store), Some(device_id)) = (config.known_devices.clone(), config.device_id.clone()) {
        let mut devices = KnownDevices::open(&store)?;
        if devices.apply_to(&device_id, &mut config) {
            devices.save()?;
            info!("Applied known device profile {}", device_id);
        } else {
            warn!("Device {} is not a known {} device in {:?}", device_id, config.kind, store);
        }
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = load_config().await?;
    let source = simulated_source(&config)?;
    let sinks = Box::new(FileSinkFactory::new(config.audio));

    let (preview, mut viewer) = WatchPreview::new();
    tokio::spawn(async move {
        while viewer.changed().await.is_ok() {
            if let Some(unit) = viewer.borrow().as_ref() {
                debug!("Preview unit {}", unit.sequence_number);
            }
        }
    });

    let (mut module, mut status_rx) = SyncModule::start(
        config,
        source,
        Arc::new(SystemClock::new()),
        sinks,
        Some(Box::new(preview)),
    )?;

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(msg) = status_rx.recv().await {
            let quitting = matches!(msg.status, Status::Quitting);
            stdout.write_all(msg.to_line().as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
            if quitting {
                break;
            }
        }
        Ok::<_, std::io::Error>(())
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => {
                    if !module.handle_line(&line).await {
                        break;
                    }
                }
                None => {
                    info!("Command input closed, shutting down");
                    module.shutdown().await?;
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                module.shutdown().await?;
                break;
            }
        }
    }

    drop(module);
    writer.await??;
    Ok(())
}
