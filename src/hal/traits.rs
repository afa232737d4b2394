use crate::core::{Payload, StreamKind};
use crate::error::Result;

/// One hardware delivery before it is stamped
#[derive(Debug, Clone)]
pub struct Delivery {
    pub payload: Payload,
    /// Hardware timestamp in nanoseconds, if the device reports one
    pub sensor_time: Option<u64>,
}

/// Outcome of waiting on a source once
#[derive(Debug, Clone)]
pub enum SourcePoll {
    Unit(Delivery),
    /// Nothing arrived within the source's own wait; poll again
    Idle,
    /// The source has no more data and will not produce again
    Exhausted,
}

/// Hardware adapter driven by the capture thread.
///
/// Methods block; they run on the dedicated capture thread only. A single
/// `next_delivery` call should not block much longer than one unit period so
/// the thread can notice a stop request.
pub trait CaptureSource: Send {
    /// Unique source identifier (e.g., "picam-0", "usb-mic-1")
    fn source_id(&self) -> &str;

    fn kind(&self) -> StreamKind;

    fn open(&mut self) -> Result<()>;

    fn next_delivery(&mut self) -> Result<SourcePoll>;

    fn close(&mut self);
}
