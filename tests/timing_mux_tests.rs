use std::path::PathBuf;

use synclogger::core::StreamKind;
use synclogger::timing::{MediaSource, MuxPlan, Muxer, StreamStart, SyncMetadata};
use synclogger::timing::offset::PairOffset;

fn stream(id: &str, kind: StreamKind, start: f64) -> StreamStart {
    StreamStart {
        stream_id: id.to_string(),
        kind,
        timing_log: PathBuf::from(format!("trial_001_{}_timing.csv", id)),
        start_wall_time: start,
        start_monotonic_time: 0.0,
        rows: 10,
        duration_seconds: 1.0,
    }
}

fn metadata(mic_offset: f64) -> SyncMetadata {
    SyncMetadata {
        trial_number: 1,
        reference_stream: "cam0".to_string(),
        streams: vec![
            stream("cam0", StreamKind::Video, 1000.0),
            stream("mic0", StreamKind::Audio, 1000.0 + mic_offset),
        ],
        offsets: vec![PairOffset {
            reference: "cam0".to_string(),
            stream: "mic0".to_string(),
            offset_seconds: mic_offset,
        }],
        drift_exceeds_budget: false,
    }
}

fn sources() -> Vec<(String, MediaSource)> {
    vec![
        (
            "cam0".to_string(),
            MediaSource::raw_video("cam.raw", 320, 240, "gray", 30.0),
        ),
        ("mic0".to_string(), MediaSource::wav("mic.wav")),
    ]
}

#[test]
fn test_later_stream_is_delayed() {
    let plan = MuxPlan::from_metadata(&metadata(0.05), sources(), "out.mp4").unwrap();

    assert_eq!(plan.delay_of("cam0"), Some(0.0));
    assert_eq!(plan.delay_of("mic0"), Some(0.05));

    let args = plan.ffmpeg_args();
    let joined = args.join(" ");
    assert!(joined.starts_with("-y -loglevel error -f rawvideo"));
    assert!(joined.contains("-video_size 320x240 -framerate 30.000 -i cam.raw"));
    assert!(joined.contains("-itsoffset 0.050000 -i mic.wav"));
    assert!(joined.contains("-map 0 -map 1"));
    assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
}

#[test]
fn test_earlier_stream_delays_reference() {
    let plan = MuxPlan::from_metadata(&metadata(-0.2), sources(), "out.mp4").unwrap();

    assert_eq!(plan.delay_of("mic0"), Some(0.0));
    assert!((plan.delay_of("cam0").unwrap() - 0.2).abs() < 1e-12);

    let args = plan.ffmpeg_args();
    let offset_pos = args.iter().position(|a| a == "-itsoffset").unwrap();
    assert_eq!(args[offset_pos + 1], "0.200000");
    assert_eq!(args.iter().filter(|a| *a == "-itsoffset").count(), 1);
}

#[test]
fn test_unknown_stream_rejected() {
    let sources = vec![("cam9".to_string(), MediaSource::wav("x.wav"))];
    assert!(MuxPlan::from_metadata(&metadata(0.0), sources, "out.mp4").is_err());
    assert!(MuxPlan::from_metadata(&metadata(0.0), Vec::new(), "out.mp4").is_err());
}

#[tokio::test]
async fn test_missing_encoder_reports_error() {
    let plan = MuxPlan::from_metadata(&metadata(0.0), sources(), "out.mp4").unwrap();
    let muxer = Muxer::with_program("/nonexistent/encoder-binary");

    let err = muxer.run(&plan).await.unwrap_err();
    assert!(err.to_string().contains("Failed to spawn"));
}
