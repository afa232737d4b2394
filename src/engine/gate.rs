use crate::core::CapturedUnit;
use crate::error::{Result, SyncError};

/// Fraction of the interval by which a unit may arrive early and still pass
pub const DEFAULT_TOLERANCE: f64 = 0.1;

/// Time-anchored rate limiter for one output stream.
///
/// Every acceptance re-anchors the next target at `accepted_time + interval`,
/// so a late or missing unit never shifts the whole schedule behind.
#[derive(Debug, Clone)]
pub struct TimingGate {
    target_rate_hz: Option<f64>,
    interval_ns: u64,
    tolerance: f64,
    next_target_time: Option<u64>,
}

fn interval_for(rate_hz: f64) -> Result<u64> {
    if !rate_hz.is_finite() || rate_hz <= 0.0 {
        return Err(SyncError::Config(format!(
            "target rate must be a positive number of hertz, got {}",
            rate_hz
        )));
    }
    Ok((1e9 / rate_hz).round() as u64)
}

impl TimingGate {
    pub fn new(target_rate_hz: f64) -> Result<Self> {
        Self::with_tolerance(target_rate_hz, DEFAULT_TOLERANCE)
    }

    pub fn with_tolerance(target_rate_hz: f64, tolerance: f64) -> Result<Self> {
        if !(0.0..1.0).contains(&tolerance) {
            return Err(SyncError::Config(format!(
                "gate tolerance must be in [0, 1), got {}",
                tolerance
            )));
        }
        Ok(Self {
            target_rate_hz: Some(target_rate_hz),
            interval_ns: interval_for(target_rate_hz)?,
            tolerance,
            next_target_time: None,
        })
    }

    /// Gate that accepts every unit
    pub fn passthrough() -> Self {
        Self {
            target_rate_hz: None,
            interval_ns: 0,
            tolerance: DEFAULT_TOLERANCE,
            next_target_time: None,
        }
    }

    /// Build from an optional rate; `None` means pass-through
    pub fn from_rate(target_rate_hz: Option<f64>, tolerance: f64) -> Result<Self> {
        match target_rate_hz {
            Some(rate) => Self::with_tolerance(rate, tolerance),
            None => Ok(Self {
                tolerance,
                ..Self::passthrough()
            }),
        }
    }

    pub fn should_accept(&mut self, unit: &CapturedUnit) -> bool {
        self.should_accept_at(unit.monotonic_time)
    }

    pub fn should_accept_at(&mut self, monotonic_ns: u64) -> bool {
        if self.target_rate_hz.is_none() {
            return true;
        }

        let accept = match self.next_target_time {
            None => true,
            Some(target) => monotonic_ns >= target.saturating_sub(self.tolerance_ns()),
        };

        if accept {
            self.next_target_time = Some(monotonic_ns + self.interval_ns);
        }
        accept
    }

    /// Change the rate without disturbing the current anchor
    pub fn set_target_rate(&mut self, target_rate_hz: Option<f64>) -> Result<()> {
        match target_rate_hz {
            Some(rate) => {
                self.interval_ns = interval_for(rate)?;
                self.target_rate_hz = Some(rate);
            }
            None => {
                self.interval_ns = 0;
                self.target_rate_hz = None;
            }
        }
        Ok(())
    }

    /// Forget the anchor; the next unit is accepted unconditionally
    pub fn reset(&mut self) {
        self.next_target_time = None;
    }

    pub fn target_rate_hz(&self) -> Option<f64> {
        self.target_rate_hz
    }

    pub fn interval_ns(&self) -> u64 {
        self.interval_ns
    }

    pub fn next_target_time(&self) -> Option<u64> {
        self.next_target_time
    }

    fn tolerance_ns(&self) -> u64 {
        (self.interval_ns as f64 * self.tolerance) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_rates_rejected() {
        assert!(TimingGate::new(0.0).is_err());
        assert!(TimingGate::new(-5.0).is_err());
        assert!(TimingGate::new(f64::NAN).is_err());
        assert!(TimingGate::new(f64::INFINITY).is_err());
        assert!(TimingGate::with_tolerance(30.0, 1.5).is_err());
    }

    #[test]
    fn test_failed_rate_change_keeps_old_rate() {
        let mut gate = TimingGate::new(10.0).unwrap();
        assert!(gate.set_target_rate(Some(-1.0)).is_err());
        assert_eq!(gate.target_rate_hz(), Some(10.0));
        assert_eq!(gate.interval_ns(), 100_000_000);
    }

    #[test]
    fn test_passthrough_accepts_everything() {
        let mut gate = TimingGate::passthrough();
        for t in [0, 1, 1, 2, 3] {
            assert!(gate.should_accept_at(t));
        }
        assert_eq!(gate.next_target_time(), None);
    }
}
