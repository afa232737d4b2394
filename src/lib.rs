pub mod buffers;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod hal;
pub mod observability;
pub mod protocol;
pub mod resilience;
pub mod sinks;
pub mod timing;

pub use error::{Result, SyncError};
