use std::fmt;
use thiserror::Error;

use crate::models::Config;

/// Values the engine cannot run with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigGuardRailError {
    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),

    #[error(
        "backoff cap ({cap_ms} ms) is below the base delay ({base_ms} ms)"
    )]
    BackoffCapBelowBase { base_ms: u64, cap_ms: u64 },

    #[error("`{key}` is {value_ms} ms; the limit is {max_ms} ms")]
    TooLong {
        key: &'static str,
        value_ms: u64,
        max_ms: u64,
    },
}

/// Upper bound for every millisecond tunable (one week).
pub const MAX_DURATION_MS: u64 = dispatch_core::clock::MAX_DELAY_MS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub key: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigWarnings(Vec<ConfigWarning>);

impl ConfigWarnings {
    pub fn push(&mut self, key: &'static str, message: impl Into<String>) {
        self.0.push(ConfigWarning {
            key,
            message: message.into(),
        });
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ConfigWarning> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|warning| warning.key == key)
    }
}

impl<'a> IntoIterator for &'a ConfigWarnings {
    type Item = &'a ConfigWarning;
    type IntoIter = std::slice::Iter<'a, ConfigWarning>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

fn non_zero(key: &'static str, value: u64) -> Result<(), ConfigGuardRailError> {
    if value == 0 {
        Err(ConfigGuardRailError::Zero(key))
    } else {
        Ok(())
    }
}

fn bounded(key: &'static str, value_ms: u64) -> Result<(), ConfigGuardRailError> {
    if value_ms > MAX_DURATION_MS {
        Err(ConfigGuardRailError::TooLong {
            key,
            value_ms,
            max_ms: MAX_DURATION_MS,
        })
    } else {
        Ok(())
    }
}

/// Reject unusable tunables and collect warnings for odd ones.
pub fn check(config: &Config) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let engine = &config.engine;
    let poll = &engine.poll;
    let backoff = &engine.channel.backoff;
    let heartbeat = &engine.channel.heartbeat;
    let enrichment = &engine.enrichment;
    let alerts = &engine.alerts;

    non_zero("engine.poll.connected_interval_ms", poll.connected_interval_ms)?;
    non_zero(
        "engine.poll.disconnected_interval_ms",
        poll.disconnected_interval_ms,
    )?;
    non_zero("engine.poll.request_timeout_ms", poll.request_timeout_ms)?;
    non_zero(
        "engine.poll.incident_page_limit",
        poll.incident_page_limit as u64,
    )?;
    non_zero("engine.channel.backoff.base_ms", backoff.base_ms)?;
    non_zero("engine.channel.heartbeat.interval_ms", heartbeat.interval_ms)?;
    non_zero("engine.channel.heartbeat.timeout_ms", heartbeat.timeout_ms)?;
    non_zero(
        "engine.enrichment.max_concurrent",
        enrichment.max_concurrent as u64,
    )?;
    non_zero(
        "engine.enrichment.thumbnail_edge",
        u64::from(enrichment.thumbnail_edge),
    )?;
    for (key, value_ms) in [
        ("engine.poll.connected_interval_ms", poll.connected_interval_ms),
        ("engine.poll.disconnected_interval_ms", poll.disconnected_interval_ms),
        ("engine.poll.request_timeout_ms", poll.request_timeout_ms),
        ("engine.channel.backoff.base_ms", backoff.base_ms),
        ("engine.channel.backoff.cap_ms", backoff.cap_ms),
        ("engine.channel.backoff.jitter_max_ms", backoff.jitter_max_ms),
        ("engine.channel.heartbeat.interval_ms", heartbeat.interval_ms),
        ("engine.channel.heartbeat.timeout_ms", heartbeat.timeout_ms),
        ("engine.enrichment.fetch_timeout_ms", enrichment.fetch_timeout_ms),
        ("engine.alerts.notice_ttl_ms", alerts.notice_ttl_ms),
        ("engine.alerts.expiry_sweep_ms", alerts.expiry_sweep_ms),
    ] {
        bounded(key, value_ms)?;
    }
    if backoff.cap_ms < backoff.base_ms {
        return Err(ConfigGuardRailError::BackoffCapBelowBase {
            base_ms: backoff.base_ms,
            cap_ms: backoff.cap_ms,
        });
    }

    let mut warnings = ConfigWarnings::default();
    if poll.request_timeout_ms >= poll.disconnected_interval_ms {
        warnings.push(
            "engine.poll.request_timeout_ms",
            format!(
                "timeout {} ms is not shorter than the fallback cadence {} ms; slow cycles will be aborted",
                poll.request_timeout_ms, poll.disconnected_interval_ms
            ),
        );
    }
    if poll.disconnected_interval_ms > poll.connected_interval_ms {
        warnings.push(
            "engine.poll.disconnected_interval_ms",
            "fallback polling is slower than connected polling",
        );
    }
    if heartbeat.timeout_ms >= heartbeat.interval_ms {
        warnings.push(
            "engine.channel.heartbeat.timeout_ms",
            "heartbeats may overlap before the previous one times out",
        );
    }
    if poll.posts_every == 0 {
        warnings.push(
            "engine.poll.posts_every",
            "0 is treated as 1 (posts refresh every cycle)",
        );
    }
    if config.api.token.is_some() && config.api.base_url.scheme() == "http" {
        warnings.push("api.url", "API token will be sent over plain http");
    }
    Ok(warnings)
}
