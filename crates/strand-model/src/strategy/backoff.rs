use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential delay between retry attempts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BackoffStrategy {
    /// Delay before the first retry.
    pub first_ms: u64,
    /// Upper bound for any single delay.
    pub max_ms: u64,
    /// Growth factor applied per attempt.
    pub factor: f64,
}

impl BackoffStrategy {
    /// No delay between attempts.
    pub const fn immediate() -> Self {
        Self {
            first_ms: 0,
            max_ms: 0,
            factor: 1.0,
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = if self.factor.is_finite() && self.factor >= 1.0 {
            self.factor
        } else {
            1.0
        };
        let raw = self.first_ms as f64 * factor.powi(attempt.min(64) as i32);
        let capped = raw.min(self.max_ms.max(self.first_ms) as f64);
        Duration::from_millis(capped as u64)
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self {
            first_ms: 1_000,
            max_ms: 30_000,
            factor: 2.0,
        }
    }
}
