pub mod audio;
pub mod camera;
pub mod scripted;

pub use audio::SimulatedMicrophone;
pub use camera::SimulatedCamera;
pub use scripted::{ScriptStep, ScriptedSource};
