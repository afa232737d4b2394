use std::sync::Arc;
use std::thread;
use std::time::Duration;

use synclogger::buffers::FrameBuffer;
use synclogger::core::{CapturedUnit, Payload};

fn unit(seq: u64) -> CapturedUnit {
    CapturedUnit::new(
        Payload::Bytes(Arc::from(vec![seq as u8])),
        seq,
        None,
        seq * 1_000_000,
        1000.0 + seq as f64 / 1000.0,
    )
}

#[test]
fn test_overflow_drops_oldest() {
    let (producer, mut consumer) = FrameBuffer::with_capacity(3).unwrap();

    let results: Vec<bool> = (1..=5).map(|seq| producer.try_put(unit(seq))).collect();
    assert_eq!(results, vec![true, true, true, false, false]);

    let remaining: Vec<u64> = consumer.drain_ready().map(|u| u.sequence_number).collect();
    assert_eq!(remaining, vec![3, 4, 5]);

    let stats = consumer.drop_stats();
    assert_eq!(stats.dropped, 2);
    assert_eq!(stats.pushed, 5);
    assert_eq!(stats.last_dropped_sequence, Some(2));
    assert_eq!(stats.last_dropped_monotonic, Some(2_000_000));
}

#[test]
fn test_zero_capacity_rejected() {
    assert!(FrameBuffer::with_capacity(0).is_err());
}

#[test]
fn test_no_drops_reported_initially() {
    let (producer, consumer) = FrameBuffer::with_capacity(2).unwrap();
    producer.try_put(unit(0));

    let stats = consumer.drop_stats();
    assert_eq!(stats.dropped, 0);
    assert_eq!(stats.last_dropped_sequence, None);
    assert_eq!(consumer.len(), 1);
    assert_eq!(producer.capacity(), 2);
}

#[tokio::test]
async fn test_recv_ends_after_close_and_drain() {
    let (producer, mut consumer) = FrameBuffer::with_capacity(4).unwrap();
    producer.try_put(unit(0));
    producer.try_put(unit(1));
    drop(producer);

    assert_eq!(consumer.recv().await.map(|u| u.sequence_number), Some(0));
    assert_eq!(consumer.recv().await.map(|u| u.sequence_number), Some(1));
    assert!(consumer.recv().await.is_none());
    assert!(consumer.is_closed());
}

#[tokio::test]
async fn test_recv_waits_for_units() {
    let (producer, mut consumer) =
        FrameBuffer::with_poll_interval(4, Duration::from_millis(1)).unwrap();

    let pending = tokio::time::timeout(Duration::from_millis(20), consumer.recv()).await;
    assert!(pending.is_err());

    producer.try_put(unit(7));
    let received = tokio::time::timeout(Duration::from_millis(200), consumer.recv())
        .await
        .unwrap();
    assert_eq!(received.map(|u| u.sequence_number), Some(7));
}

#[tokio::test]
async fn test_producer_thread_never_blocks() {
    let (producer, mut consumer) = FrameBuffer::with_capacity(8).unwrap();

    let handle = thread::spawn(move || {
        for seq in 0..10_000 {
            producer.try_put(unit(seq));
        }
    });

    let mut last = None;
    let mut received = 0u64;
    while let Some(unit) = consumer.recv().await {
        if let Some(prev) = last {
            assert!(unit.sequence_number > prev, "arrival order must hold");
        }
        last = Some(unit.sequence_number);
        received += 1;
    }
    handle.join().unwrap();

    let stats = consumer.drop_stats();
    assert_eq!(received + stats.dropped, 10_000);
    assert_eq!(last, Some(9_999));
}
