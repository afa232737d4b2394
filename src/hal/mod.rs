pub mod capture;
pub mod mock;
pub mod traits;

pub use capture::{CaptureEvent, CaptureThread};
pub use traits::{CaptureSource, Delivery, SourcePoll};
