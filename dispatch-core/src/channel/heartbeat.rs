use crate::clock::millis;

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};
use tokio::time::Instant;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub interval_ms: u64,
    /// How long a heartbeat may go unanswered before the channel is stale.
    pub timeout_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: 15_000,
            timeout_ms: 5_000,
        }
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        millis(self.interval_ms.max(1))
    }

    pub fn timeout(&self) -> Duration {
        millis(self.timeout_ms)
    }
}

/// Outstanding heartbeats for one session.
#[derive(Debug, Default)]
pub(crate) struct HeartbeatTracker {
    next_nonce: u64,
    pending: HashMap<u64, Instant>,
}

impl HeartbeatTracker {
    pub(crate) fn start(&mut self, now: Instant) -> u64 {
        self.next_nonce += 1;
        self.pending.insert(self.next_nonce, now);
        self.next_nonce
    }

    /// Round-trip time for an acknowledged nonce. Unknown or already expired
    /// nonces yield `None`.
    pub(crate) fn ack(&mut self, nonce: u64, now: Instant) -> Option<Duration> {
        self.pending
            .remove(&nonce)
            .map(|sent| now.saturating_duration_since(sent))
    }

    /// Forget heartbeats older than `timeout`; returns how many expired.
    pub(crate) fn expire(&mut self, now: Instant, timeout: Duration) -> usize {
        let before = self.pending.len();
        self.pending
            .retain(|_, sent| now.saturating_duration_since(*sent) < timeout);
        before - self.pending.len()
    }

    /// Deadline of the oldest outstanding heartbeat.
    pub(crate) fn next_deadline(&self, timeout: Duration) -> Option<Instant> {
        self.pending.values().min().map(|sent| *sent + timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_measures_round_trip() {
        let mut tracker = HeartbeatTracker::default();
        let sent = Instant::now();
        let nonce = tracker.start(sent);
        let rtt = tracker.ack(nonce, sent + Duration::from_millis(40));
        assert_eq!(rtt, Some(Duration::from_millis(40)));
        assert_eq!(tracker.ack(nonce, sent), None);
    }

    #[test]
    fn unanswered_heartbeats_expire() {
        let mut tracker = HeartbeatTracker::default();
        let sent = Instant::now();
        let nonce = tracker.start(sent);
        tracker.start(sent + Duration::from_secs(4));
        let expired = tracker.expire(sent + Duration::from_secs(5), Duration::from_secs(5));
        assert_eq!(expired, 1);
        assert_eq!(tracker.ack(nonce, sent + Duration::from_secs(6)), None);
        assert_eq!(
            tracker.next_deadline(Duration::from_secs(5)),
            Some(sent + Duration::from_secs(9))
        );
    }
}
