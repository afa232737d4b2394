//! Inbound commands from the supervising logger process.
//!
//! One JSON object per line; `command` selects the variant and `id` is echoed
//! back as `in_reply_to` on every resulting status.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub id: String,
    #[serde(flatten)]
    pub command: Command,
}

/// Every command the module accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    StartRecording {
        session_dir: PathBuf,
        trial_number: u32,
    },
    StopRecording,
    /// Absent fields leave the corresponding gate unchanged
    ApplyConfig {
        #[serde(default)]
        record_rate_hz: Option<f64>,
        #[serde(default)]
        preview_rate_hz: Option<f64>,
    },
    GetStatus,
    Quit,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::StartRecording { .. } => "start_recording",
            Command::StopRecording => "stop_recording",
            Command::ApplyConfig { .. } => "apply_config",
            Command::GetStatus => "get_status",
            Command::Quit => "quit",
        }
    }
}

impl CommandEnvelope {
    pub fn new(id: impl Into<String>, command: Command) -> Self {
        Self {
            id: id.into(),
            command,
        }
    }

    pub fn parse(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line.trim())?)
    }
}
