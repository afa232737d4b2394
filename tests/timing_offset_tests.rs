use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

use synclogger::error::SyncError;
use synclogger::timing::{OffsetCalculator, SyncMetadata};

const VIDEO_HEADER: &str = "trial,stream,wall_time,monotonic_time,sequence,frame_index,sensor_time_ns";
const AUDIO_HEADER: &str =
    "trial,stream,wall_time,monotonic_time,sequence,chunk_index,sample_count,sensor_time_ns";

fn write_video_log(dir: &Path, stream: &str, wall_times: &[f64]) -> PathBuf {
    let path = dir.join(format!("trial_001_{}_timing.csv", stream));
    let mut content = format!("{}\n", VIDEO_HEADER);
    for (idx, wall) in wall_times.iter().enumerate() {
        content.push_str(&format!("1,{},{:.6},{}.000000000,{},{},\n", stream, wall, idx, idx, idx));
    }
    fs::write(&path, content).unwrap();
    path
}

fn write_audio_log(dir: &Path, stream: &str, wall_times: &[f64]) -> PathBuf {
    let path = dir.join(format!("trial_001_{}_timing.csv", stream));
    let mut content = format!("{}\n", AUDIO_HEADER);
    for (idx, wall) in wall_times.iter().enumerate() {
        content.push_str(&format!("1,{},{:.6},{}.000000000,{},{},960,\n", stream, wall, idx, idx, idx));
    }
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_offset_between_two_streams() {
    let dir = tempdir().unwrap();
    let a = write_video_log(dir.path(), "cam0", &[1000.0, 1000.033333]);
    let b = write_audio_log(dir.path(), "mic0", &[1000.05, 1000.07]);

    let offset = OffsetCalculator::offset(&a, &b).unwrap();
    assert_eq!(offset.offset_seconds, 0.05);
    assert_eq!(offset.reference.stream_id, "cam0");
    assert_eq!(offset.other.stream_id, "mic0");
    assert_eq!(offset.other.rows, 2);
}

#[test]
fn test_offset_is_antisymmetric() {
    let dir = tempdir().unwrap();
    let a = write_video_log(dir.path(), "cam0", &[1700000000.123456]);
    let b = write_video_log(dir.path(), "cam1", &[1700000000.100001]);

    let ab = OffsetCalculator::offset(&a, &b).unwrap().offset_seconds;
    let ba = OffsetCalculator::offset(&b, &a).unwrap().offset_seconds;
    assert_eq!(ab, -ba);
    assert_eq!(ab, -0.023455);
}

#[test]
fn test_empty_log_is_an_error() {
    let dir = tempdir().unwrap();
    let a = write_video_log(dir.path(), "cam0", &[1000.0]);
    let empty = write_video_log(dir.path(), "cam1", &[]);

    let err = OffsetCalculator::offset(&a, &empty).unwrap_err();
    assert!(matches!(err, SyncError::OffsetComputation(_)));
}

#[test]
fn test_missing_log_is_an_error() {
    let dir = tempdir().unwrap();
    let a = write_video_log(dir.path(), "cam0", &[1000.0]);

    let err = OffsetCalculator::offset(&a, dir.path().join("nope.csv")).unwrap_err();
    assert!(matches!(err, SyncError::OffsetComputation(_)));
}

#[test]
fn test_malformed_log_is_an_error() {
    let dir = tempdir().unwrap();
    let a = write_video_log(dir.path(), "cam0", &[1000.0]);
    let bad = dir.path().join("bad.csv");
    fs::write(&bad, "frame,time\n1,2\n").unwrap();

    let err = OffsetCalculator::offset(&a, &bad).unwrap_err();
    assert!(matches!(err, SyncError::OffsetComputation(_)));
}

#[test]
fn test_sync_metadata_written_and_loaded() {
    let dir = tempdir().unwrap();
    let cam = write_video_log(dir.path(), "cam0", &[1000.0, 1000.5]);
    let mic = write_audio_log(dir.path(), "mic0", &[1000.25, 1000.75]);
    let cam1 = write_video_log(dir.path(), "cam1", &[999.9]);

    let metadata = OffsetCalculator::sync_metadata(1, &[&cam, &mic, &cam1]).unwrap();
    assert_eq!(metadata.reference_stream, "cam0");
    assert_eq!(metadata.offset_of("cam0"), Some(0.0));
    assert_eq!(metadata.offset_of("mic0"), Some(0.25));
    assert_eq!(metadata.offset_of("cam1"), Some(-0.1));
    assert!(!metadata.drift_exceeds_budget);

    let path = metadata.write(dir.path()).unwrap();
    assert_eq!(path, dir.path().join("trial_001_sync.json"));
    assert_eq!(SyncMetadata::load(&path).unwrap(), metadata);
}

#[test]
fn test_long_session_flagged() {
    let dir = tempdir().unwrap();
    let cam = write_video_log(dir.path(), "cam0", &[1000.0, 1000.0 + 3601.0]);
    let mic = write_audio_log(dir.path(), "mic0", &[1000.1]);

    let metadata = OffsetCalculator::sync_metadata(1, &[&cam, &mic]).unwrap();
    assert!(metadata.drift_exceeds_budget);
}

#[test]
fn test_no_logs_is_an_error() {
    let logs: Vec<PathBuf> = Vec::new();
    assert!(OffsetCalculator::sync_metadata(1, &logs).is_err());
}
