pub mod clock;
pub mod unit;

pub use clock::{Clock, ManualClock, SystemClock};
pub use unit::{CapturedUnit, Payload, StreamKind};
