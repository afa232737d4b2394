use std::path::{Path, PathBuf};

use crate::core::StreamKind;
use crate::error::{Result, SyncError};

pub fn trial_prefix(trial_number: u32) -> String {
    format!("trial_{:03}", trial_number)
}

/// `trial_NNN_sync.json` inside `session_dir`
pub fn sync_metadata_path(session_dir: &Path, trial_number: u32) -> PathBuf {
    session_dir.join(format!("{}_sync.json", trial_prefix(trial_number)))
}

fn media_extension(kind: StreamKind) -> &'static str {
    match kind {
        StreamKind::Video => "raw",
        StreamKind::Audio => "wav",
    }
}

/// Output files of one stream in one trial
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialPaths {
    pub session_dir: PathBuf,
    pub trial_number: u32,
    pub stream_id: String,
    pub kind: StreamKind,
    pub timing_log: PathBuf,
    pub media_file: PathBuf,
}

impl TrialPaths {
    pub fn new(
        session_dir: impl Into<PathBuf>,
        trial_number: u32,
        stream_id: &str,
        kind: StreamKind,
    ) -> Self {
        let session_dir = session_dir.into();
        let prefix = trial_prefix(trial_number);
        let timing_log = session_dir.join(format!("{}_{}_timing.csv", prefix, stream_id));
        let media_file =
            session_dir.join(format!("{}_{}.{}", prefix, stream_id, media_extension(kind)));

        Self {
            session_dir,
            trial_number,
            stream_id: stream_id.to_string(),
            kind,
            timing_log,
            media_file,
        }
    }

    /// Create the session directory; an unusable path is a configuration error
    pub async fn prepare(&self) -> Result<()> {
        if self.session_dir.as_os_str().is_empty() {
            return Err(SyncError::Config("session directory is empty".to_string()));
        }
        tokio::fs::create_dir_all(&self.session_dir)
            .await
            .map_err(|e| {
                SyncError::Config(format!(
                    "cannot create session directory {:?}: {}",
                    self.session_dir, e
                ))
            })
    }
}
