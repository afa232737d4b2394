use std::sync::Arc;

use synclogger::buffers::FrameBuffer;
use synclogger::core::{CapturedUnit, Payload};
use synclogger::observability::{Metrics, MetricsMonitor, StreamMetrics, CAPTURED, RECORD};

fn unit_at(seq: u64, monotonic_ms: u64) -> CapturedUnit {
    CapturedUnit::new(
        Payload::Bytes(Arc::from(vec![0u8])),
        seq,
        None,
        monotonic_ms * 1_000_000,
        0.0,
    )
}

#[test]
fn test_rate_from_regular_arrivals() {
    let mut metrics = StreamMetrics::new("cam", 60);
    for i in 0..31 {
        metrics.record(i * 33_333_333);
    }

    assert!((metrics.rate_hz() - 30.0).abs() < 0.01);
    assert!(metrics.jitter_ms() < 0.001);
    assert_eq!(metrics.count(), 31);
}

#[test]
fn test_jitter_is_interval_std_dev() {
    let mut metrics = StreamMetrics::new("cam", 60);
    // intervals alternate 30 ms / 40 ms
    let mut t = 0;
    for i in 0..11 {
        metrics.record(t * 1_000_000);
        t += if i % 2 == 0 { 30 } else { 40 };
    }

    assert!((metrics.jitter_ms() - 5.0).abs() < 1e-9);
}

#[test]
fn test_window_only_keeps_recent_arrivals() {
    let mut metrics = StreamMetrics::new("cam", 5);
    // slow start, then fast
    for i in 0..10 {
        metrics.record(i * 1_000_000_000);
    }
    for i in 0..5 {
        metrics.record(10_000_000_000 + i * 10_000_000);
    }

    assert!((metrics.rate_hz() - 100.0).abs() < 0.01);
    assert_eq!(metrics.count(), 15);
}

#[test]
fn test_empty_metrics_report_zero() {
    let metrics = StreamMetrics::new("idle", 60);
    assert_eq!(metrics.rate_hz(), 0.0);
    assert_eq!(metrics.jitter_ms(), 0.0);
}

#[test]
fn test_report_combines_streams_and_drops() {
    let (producer, consumer) = FrameBuffer::with_capacity(1).unwrap();
    producer.try_put(unit_at(0, 0));
    producer.try_put(unit_at(1, 10));

    let mut metrics = Metrics::new(60);
    for i in 0..4 {
        let unit = unit_at(i, i * 100);
        metrics.update_capture(&unit);
        if i % 2 == 0 {
            metrics.update_accept(RECORD, &unit);
        }
    }
    metrics.record_error(RECORD);
    metrics.set_drop_stats(consumer.drop_stats());

    let report = metrics.get_report();
    assert_eq!(report.captured.name, CAPTURED);
    assert_eq!(report.captured.count, 4);
    assert_eq!(metrics.accepted_count(RECORD), 2);
    assert_eq!(report.stream(RECORD).map(|s| s.errors), Some(1));
    assert_eq!(report.dropped, 1);
    assert_eq!(report.last_dropped_sequence, Some(0));

    let text = MetricsMonitor::new("cam0").generate_report(&report);
    assert!(text.contains("=== cam0 Metrics ==="));
    assert!(text.contains("[record]"));
    assert!(text.contains("Dropped: 1 (last seq 0)"));
    assert!(text.contains("  Errors: 1\n"));
}

#[test]
fn test_stalled_stream_rate_decays() {
    let mut metrics = StreamMetrics::new("cam", 60);
    for i in 0..11 {
        metrics.record(i * 100_000_000);
    }
    let last = 1_000_000_000;

    // within one interval of the last arrival the window rate stands
    assert!((metrics.rate_hz_at(last + 50_000_000) - 10.0).abs() < 1e-9);

    // one second of silence doubles the span
    assert!((metrics.rate_hz_at(last + 1_000_000_000) - 5.0).abs() < 1e-9);
    assert!(metrics.rate_hz_at(last + 60_000_000_000) < 0.2);
    assert!((metrics.rate_hz() - 10.0).abs() < 1e-9);
}

#[test]
fn test_report_at_uses_stall_time() {
    let mut metrics = Metrics::new(60);
    for i in 0..11 {
        metrics.update_capture(&unit_at(i, i * 100));
    }

    assert!((metrics.get_report().captured.rate_hz - 10.0).abs() < 1e-9);
    let stalled = metrics.get_report_at(2_000_000_000);
    assert!((stalled.captured.rate_hz - 5.0).abs() < 1e-9);
    assert_eq!(stalled.captured.count, 11);
}
