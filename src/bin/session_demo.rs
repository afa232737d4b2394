use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use synclogger::config::{AudioFormat, ModuleConfig};
use synclogger::core::{Clock, SystemClock};
use synclogger::engine::{SyncModule, TrialPaths};
use synclogger::hal::mock::{SimulatedCamera, SimulatedMicrophone};
use synclogger::protocol::{Command, CommandEnvelope, StatusMessage};
use synclogger::sinks::FileSinkFactory;
use synclogger::timing::{MediaSource, MuxPlan, OffsetCalculator};
use tokio::sync::mpsc::UnboundedReceiver;

const TRIAL: u32 = 1;

fn print_statuses(label: &str, rx: &mut UnboundedReceiver<StatusMessage>) {
    while let Ok(msg) = rx.try_recv() {
        println!("  [{}] {}", label, msg.to_line());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    println!("synclogger - two-stream session demo");
    println!("====================================\n");

    let session_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("synclogger-demo"));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

    let camera_config = ModuleConfig::default();
    let audio_format = AudioFormat {
        sample_rate: 48000,
        channels: 1,
    };
    let mic_config = ModuleConfig::audio("mic0", audio_format);
    let video = camera_config.video.clone().unwrap_or_default();

    let (mut camera, mut camera_status) = SyncModule::start(
        camera_config.clone(),
        Box::new(SimulatedCamera::new("cam0", video.width, video.height, 60.0)),
        clock.clone(),
        Box::new(FileSinkFactory::new(None)),
        None,
    )?;
    let (mut mic, mut mic_status) = SyncModule::start(
        mic_config.clone(),
        Box::new(SimulatedMicrophone::new("mic0", audio_format).with_frequency(440.0)),
        clock.clone(),
        Box::new(FileSinkFactory::new(Some(audio_format))),
        None,
    )?;

    println!("Recording trial {} into {:?} for 2 seconds...", TRIAL, session_dir);
    let start = Command::StartRecording {
        session_dir: session_dir.clone(),
        trial_number: TRIAL,
    };
    camera.handle(CommandEnvelope::new("start-cam", start.clone())).await;
    // the microphone starts a little later, which the offset must show
    tokio::time::sleep(Duration::from_millis(150)).await;
    mic.handle(CommandEnvelope::new("start-mic", start)).await;

    tokio::time::sleep(Duration::from_secs(2)).await;

    camera.handle(CommandEnvelope::new("stop-cam", Command::StopRecording)).await;
    mic.handle(CommandEnvelope::new("stop-mic", Command::StopRecording)).await;

    let camera_summary = camera.shutdown().await?;
    let mic_summary = mic.shutdown().await?;

    println!("\nStatus lines:");
    print_statuses("cam0", &mut camera_status);
    print_statuses("mic0", &mut mic_status);

    println!(
        "\ncam0: {} captured, {} recorded, {} dropped",
        camera_summary.captured, camera_summary.recorded, camera_summary.dropped
    );
    println!(
        "mic0: {} captured, {} recorded, {} dropped",
        mic_summary.captured, mic_summary.recorded, mic_summary.dropped
    );

    let camera_paths = TrialPaths::new(&session_dir, TRIAL, "cam0", camera_config.kind);
    let mic_paths = TrialPaths::new(&session_dir, TRIAL, "mic0", mic_config.kind);

    let metadata =
        OffsetCalculator::sync_metadata(TRIAL, &[&camera_paths.timing_log, &mic_paths.timing_log])?;
    let metadata_path = metadata.write(&session_dir)?;
    println!("\nSync metadata written to {:?}", metadata_path);
    for offset in &metadata.offsets {
        println!(
            "  {} starts {:+.6}s relative to {}",
            offset.stream, offset.offset_seconds, offset.reference
        );
    }

    let plan = MuxPlan::from_metadata(
        &metadata,
        vec![
            (
                "cam0".to_string(),
                MediaSource::raw_video(
                    &camera_paths.media_file,
                    video.width,
                    video.height,
                    &video.pixel_format,
                    camera_config.record_rate_hz.unwrap_or(30.0),
                ),
            ),
            ("mic0".to_string(), MediaSource::wav(&mic_paths.media_file)),
        ],
        session_dir.join(format!("trial_{:03}_muxed.mp4", TRIAL)),
    )?;

    println!("\nMux command:\n  ffmpeg {}", plan.ffmpeg_args().join(" "));

    Ok(())
}
