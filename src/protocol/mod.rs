pub mod command;
pub mod status;

pub use command::{Command, CommandEnvelope};
pub use status::{ErrorKind, Status, StatusMessage};
