pub mod factory;
pub mod preview;
pub mod raw_video;
pub mod traits;
pub mod wav;

pub use factory::FileSinkFactory;
pub use preview::WatchPreview;
pub use raw_video::RawVideoSink;
pub use traits::{PreviewSink, RecordingSink, SinkFactory};
pub use wav::WavSink;
