use crate::clock::millis;

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reconnect delay policy: `min(base * 2^attempt, cap) + jitter`, with the
/// jitter drawn uniformly from `[0, jitter_max]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_ms: u64,
    pub cap_ms: u64,
    pub jitter_max_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: 1_000,
            cap_ms: 30_000,
            jitter_max_ms: 1_000,
        }
    }
}

impl BackoffConfig {
    /// Delay before jitter for the given attempt (0-based).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = self.base_ms.saturating_mul(factor).min(self.cap_ms);
        millis(delay)
    }

    pub fn delay_with<R: Rng>(
        &self,
        attempt: u32,
        rng: &mut R,
    ) -> Duration {
        let jitter = if self.jitter_max_ms == 0 {
            0
        } else {
            rng.random_range(0..=self.jitter_max_ms)
        };
        self.base_delay(attempt) + millis(jitter)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, &mut rand::rng())
    }
}
