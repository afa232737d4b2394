pub mod mux;
pub mod offset;
pub mod reader;
pub mod schema;
pub mod writer;

pub use mux::{MediaSource, MuxPlan, Muxer};
pub use offset::{OffsetCalculator, StreamOffset, StreamStart, SyncMetadata};
pub use reader::{read_timing_log, TimingLogContents, TimingRecord};
pub use schema::{EntryExtra, TimingLogEntry};
pub use writer::TimingLog;
