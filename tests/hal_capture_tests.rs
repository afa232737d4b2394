use std::sync::Arc;
use std::time::Duration;

use synclogger::buffers::FrameBuffer;
use synclogger::core::{Clock, ManualClock, Payload, StreamKind, SystemClock};
use synclogger::hal::mock::{ScriptStep, ScriptedSource, SimulatedCamera};
use synclogger::hal::{CaptureEvent, CaptureThread};
use synclogger::resilience::RestartStrategy;
use tokio_util::sync::CancellationToken;

fn bytes(value: u8) -> ScriptStep {
    ScriptStep::Deliver(Payload::Bytes(Arc::from(vec![value])), Some(u64::from(value)))
}

fn manual_clock() -> Arc<dyn Clock> {
    Arc::new(ManualClock::new(1_700_000_000.0))
}

#[tokio::test]
async fn test_units_are_stamped_in_order() {
    let (producer, mut consumer) = FrameBuffer::with_capacity(16).unwrap();
    let source = ScriptedSource::new(
        "scripted",
        StreamKind::Video,
        [bytes(0), bytes(1), ScriptStep::Idle, bytes(2)],
    );

    let (mut capture, events) =
        CaptureThread::spawn(Box::new(source), producer, manual_clock(), RestartStrategy::Never)
            .unwrap();

    let mut units = Vec::new();
    while let Some(unit) = consumer.recv().await {
        units.push(unit);
    }
    capture.stop().await.unwrap();

    let sequences: Vec<u64> = units.iter().map(|u| u.sequence_number).collect();
    assert_eq!(sequences, vec![0, 1, 2]);
    assert_eq!(units[2].sensor_time, Some(2));
    assert_eq!(units[0].wall_time, 1_700_000_000.0);

    let events: Vec<CaptureEvent> = events.try_iter().collect();
    assert_eq!(
        events,
        vec![
            CaptureEvent::Opened {
                source_id: "scripted".to_string()
            },
            CaptureEvent::Exhausted {
                source_id: "scripted".to_string()
            },
        ]
    );
}

#[tokio::test]
async fn test_failure_reopens_and_keeps_sequence() {
    let (producer, mut consumer) = FrameBuffer::with_capacity(16).unwrap();
    let source = ScriptedSource::new(
        "flaky",
        StreamKind::Video,
        [bytes(0), ScriptStep::Fail("usb reset".to_string()), bytes(1)],
    );

    let (mut capture, events) = CaptureThread::spawn(
        Box::new(source),
        producer,
        manual_clock(),
        RestartStrategy::Immediate { max_attempts: 3 },
    )
    .unwrap();

    let mut sequences = Vec::new();
    while let Some(unit) = consumer.recv().await {
        sequences.push(unit.sequence_number);
    }
    capture.stop().await.unwrap();

    assert_eq!(sequences, vec![0, 1]);

    let events: Vec<CaptureEvent> = events.try_iter().collect();
    assert!(matches!(events[1], CaptureEvent::Failed { attempt: 1, .. }));
    assert_eq!(
        events[2],
        CaptureEvent::Reopened {
            source_id: "flaky".to_string()
        }
    );
}

#[tokio::test]
async fn test_gives_up_after_restart_budget() {
    let (producer, mut consumer) = FrameBuffer::with_capacity(4).unwrap();
    let source = ScriptedSource::new("gone", StreamKind::Audio, [bytes(0)]).with_open_failures(10);

    let (mut capture, events) = CaptureThread::spawn(
        Box::new(source),
        producer,
        manual_clock(),
        RestartStrategy::Immediate { max_attempts: 2 },
    )
    .unwrap();

    assert!(consumer.recv().await.is_none());
    capture.stop().await.unwrap();

    let events: Vec<CaptureEvent> = events.try_iter().collect();
    let failures = events
        .iter()
        .filter(|e| matches!(e, CaptureEvent::Failed { .. }))
        .count();
    assert_eq!(failures, 3);
    assert!(matches!(events.last(), Some(CaptureEvent::GaveUp { .. })));
}

#[tokio::test]
async fn test_stop_closes_buffer() {
    let (producer, mut consumer) = FrameBuffer::with_capacity(64).unwrap();
    let camera = SimulatedCamera::new("cam0", 4, 4, 200.0);

    let (mut capture, _events) = CaptureThread::spawn(
        Box::new(camera),
        producer,
        Arc::new(SystemClock::new()),
        RestartStrategy::default(),
    )
    .unwrap();
    assert_eq!(capture.source_id(), "cam0");

    tokio::time::sleep(Duration::from_millis(100)).await;
    capture.stop().await.unwrap();
    assert!(capture.is_finished());

    let mut count = 0;
    let mut last_time = 0;
    while let Some(unit) = consumer.recv().await {
        assert!(unit.monotonic_time >= last_time);
        last_time = unit.monotonic_time;
        count += 1;
    }
    assert!(count > 5, "only {} frames captured", count);
    assert!(consumer.is_closed());
}

#[tokio::test]
async fn test_parent_cancellation_stops_capture() {
    let (producer, mut consumer) = FrameBuffer::with_capacity(64).unwrap();
    let camera = SimulatedCamera::new("cam1", 4, 4, 200.0);
    let parent = CancellationToken::new();

    let (mut capture, _events) = CaptureThread::spawn_with_cancel(
        Box::new(camera),
        producer,
        Arc::new(SystemClock::new()),
        RestartStrategy::default(),
        parent.child_token(),
    )
    .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    parent.cancel();

    // the buffer closes once the thread notices the cancellation
    let drained = tokio::time::timeout(Duration::from_secs(2), async {
        while consumer.recv().await.is_some() {}
    })
    .await;
    assert!(drained.is_ok(), "capture thread ignored cancellation");
    assert!(consumer.is_closed());

    capture.stop().await.unwrap();
}
