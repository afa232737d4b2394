use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the capture thread reopens a source after it fails
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RestartStrategy {
    /// Never reopen after error
    Never,

    /// Reopen immediately, up to `max_attempts` times in a row
    Immediate { max_attempts: u32 },

    /// Exponential backoff reopen
    Exponential {
        base_ms: u64,
        max_ms: u64,
        max_attempts: u32,
    },
}

impl RestartStrategy {
    /// Delay before reopen attempt `attempt` (1-based); `None` means give up
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        match self {
            RestartStrategy::Never => None,
            RestartStrategy::Immediate { max_attempts } => {
                (attempt <= *max_attempts).then_some(Duration::ZERO)
            }
            RestartStrategy::Exponential {
                base_ms,
                max_ms,
                max_attempts,
            } => {
                if attempt == 0 || attempt > *max_attempts {
                    return None;
                }
                let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
                let delay = base_ms.saturating_mul(factor).min(*max_ms);
                Some(Duration::from_millis(delay))
            }
        }
    }
}

impl Default for RestartStrategy {
    fn default() -> Self {
        RestartStrategy::Exponential {
            base_ms: 250,
            max_ms: 8_000,
            max_attempts: 10,
        }
    }
}
