//! Wall-clock source used to stamp events that arrive without a timestamp.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::{fmt, sync::Arc, time::Duration};

/// Longest delay any tunable may express (one week). Larger settings are
/// clamped so deadline arithmetic cannot overflow.
pub const MAX_DELAY_MS: u64 = 7 * 24 * 60 * 60 * 1_000;

/// `ms` as a [`Duration`], clamped to [`MAX_DELAY_MS`].
pub fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms.min(MAX_DELAY_MS))
}

pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
