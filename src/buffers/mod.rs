pub mod frame_buffer;

pub use frame_buffer::{DropStats, FrameBuffer, FrameConsumer, FrameProducer};
