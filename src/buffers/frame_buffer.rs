use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core::CapturedUnit;
use crate::error::{Result, SyncError};

/// Default ring capacity in units
pub const DEFAULT_CAPACITY: usize = 8;

/// Default sleep between empty polls on the consumer side
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

const NONE: u64 = u64::MAX;

struct Shared {
    capacity: usize,
    closed: AtomicBool,
    pushed: AtomicU64,
    dropped: AtomicU64,
    last_dropped_sequence: AtomicU64,
    last_dropped_monotonic: AtomicU64,
}

/// Snapshot of overflow drops, read from the consumer side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropStats {
    pub pushed: u64,
    pub dropped: u64,
    pub last_dropped_sequence: Option<u64>,
    pub last_dropped_monotonic: Option<u64>,
}

/// Capacity-bounded ring between the capture thread and the router.
///
/// Backed by a bounded crossbeam channel. On overflow the producer pulls the
/// oldest unit off its own receiver handle so the newest one always fits.
/// Neither side ever blocks.
pub struct FrameBuffer;

impl FrameBuffer {
    pub fn with_capacity(capacity: usize) -> Result<(FrameProducer, FrameConsumer)> {
        Self::with_poll_interval(capacity, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(
        capacity: usize,
        poll_interval: Duration,
    ) -> Result<(FrameProducer, FrameConsumer)> {
        if capacity == 0 {
            return Err(SyncError::Config(
                "frame buffer capacity must be at least 1".to_string(),
            ));
        }

        let (tx, rx) = bounded(capacity);
        let shared = Arc::new(Shared {
            capacity,
            closed: AtomicBool::new(false),
            pushed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            last_dropped_sequence: AtomicU64::new(NONE),
            last_dropped_monotonic: AtomicU64::new(NONE),
        });

        Ok((
            FrameProducer {
                tx,
                evict: rx.clone(),
                shared: shared.clone(),
            },
            FrameConsumer {
                rx,
                shared,
                poll_interval,
            },
        ))
    }
}

fn drop_stats(shared: &Shared) -> DropStats {
    let seq = shared.last_dropped_sequence.load(Ordering::Relaxed);
    let mono = shared.last_dropped_monotonic.load(Ordering::Relaxed);
    DropStats {
        pushed: shared.pushed.load(Ordering::Relaxed),
        dropped: shared.dropped.load(Ordering::Relaxed),
        last_dropped_sequence: (seq != NONE).then_some(seq),
        last_dropped_monotonic: (mono != NONE).then_some(mono),
    }
}

/// Capture-thread half. Closing (or dropping) it ends the consumer's drain.
pub struct FrameProducer {
    tx: Sender<CapturedUnit>,
    evict: Receiver<CapturedUnit>,
    shared: Arc<Shared>,
}

impl FrameProducer {
    /// Push a unit without blocking.
    ///
    /// Returns `false` when the ring was full and its oldest unit was evicted
    /// to make room; the new unit is always stored.
    pub fn try_put(&self, unit: CapturedUnit) -> bool {
        self.shared.pushed.fetch_add(1, Ordering::Relaxed);

        let mut pending = unit;
        let mut stored_without_eviction = true;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => return stored_without_eviction,
                Err(TrySendError::Full(unit)) => {
                    // the router may have freed a slot in the meantime
                    if let Ok(evicted) = self.evict.try_recv() {
                        self.record_drop(&evicted);
                        stored_without_eviction = false;
                    }
                    pending = unit;
                }
                // unreachable while `evict` holds the receiving side open
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
    }

    fn record_drop(&self, evicted: &CapturedUnit) {
        self.shared.dropped.fetch_add(1, Ordering::Relaxed);
        self.shared
            .last_dropped_sequence
            .store(evicted.sequence_number, Ordering::Relaxed);
        self.shared
            .last_dropped_monotonic
            .store(evicted.monotonic_time, Ordering::Relaxed);
    }

    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    pub fn drop_stats(&self) -> DropStats {
        drop_stats(&self.shared)
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

impl Drop for FrameProducer {
    fn drop(&mut self) {
        self.close();
    }
}

/// Router half. Units leave the buffer only through this type.
pub struct FrameConsumer {
    rx: Receiver<CapturedUnit>,
    shared: Arc<Shared>,
    poll_interval: Duration,
}

impl FrameConsumer {
    /// Next unit in arrival order.
    ///
    /// Suspends while the ring is empty; returns `None` once the producer has
    /// closed the buffer and everything left in it was taken. Cancel-safe.
    pub async fn recv(&mut self) -> Option<CapturedUnit> {
        loop {
            if let Ok(unit) = self.rx.try_recv() {
                return Some(unit);
            }
            if self.shared.closed.load(Ordering::Acquire) {
                // a push may have landed between the pop above and the close
                return self.rx.try_recv().ok();
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    pub fn try_pop(&mut self) -> Option<CapturedUnit> {
        self.rx.try_recv().ok()
    }

    /// Take everything currently buffered without waiting
    pub fn drain_ready(&mut self) -> impl Iterator<Item = CapturedUnit> + '_ {
        std::iter::from_fn(move || self.rx.try_recv().ok())
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn drop_stats(&self) -> DropStats {
        drop_stats(&self.shared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Payload;

    fn unit(seq: u64) -> CapturedUnit {
        CapturedUnit::new(Payload::Bytes(Arc::from(&[0u8][..])), seq, None, seq * 1000, 0.0)
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(FrameBuffer::with_capacity(0).is_err());
    }

    #[test]
    fn test_drop_stats_start_empty() {
        let (producer, consumer) = FrameBuffer::with_capacity(2).unwrap();
        assert_eq!(producer.drop_stats(), DropStats::default());

        producer.try_put(unit(1));
        producer.try_put(unit(2));
        producer.try_put(unit(3));

        let stats = consumer.drop_stats();
        assert_eq!(stats.pushed, 3);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.last_dropped_sequence, Some(1));
        assert_eq!(stats.last_dropped_monotonic, Some(1000));
    }

    #[test]
    fn test_dropping_producer_closes() {
        let (producer, consumer) = FrameBuffer::with_capacity(2).unwrap();
        assert!(!consumer.is_closed());
        drop(producer);
        assert!(consumer.is_closed());
    }
}
