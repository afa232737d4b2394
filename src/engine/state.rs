use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Recording session states
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Recording {
        trial_number: u32,
        #[serde(skip)]
        started_at: Option<Instant>,
        units_written: u64,
    },
    Stopping {
        trial_number: u32,
    },
    Error {
        error_msg: String,
        recoverable: bool,
    },
}

impl SessionState {
    /// Check if transition from current state to target state is valid
    pub fn can_transition_to(&self, target: &SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, target),
            (Idle, Recording { .. }) |

            // progress updates while recording
            (Recording { .. }, Recording { .. }) |
            (Recording { .. }, Stopping { .. }) |
            (Recording { .. }, Error { .. }) |

            (Stopping { .. }, Idle) |
            (Stopping { .. }, Error { .. }) |

            (Error { recoverable: true, .. }, Idle)
        )
    }

    /// Get human-readable state name
    pub fn name(&self) -> &str {
        match self {
            Self::Idle => "idle",
            Self::Recording { .. } => "recording",
            Self::Stopping { .. } => "stopping",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording { .. })
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Idle
    }
}
