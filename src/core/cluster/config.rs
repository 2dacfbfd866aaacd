// src/core/cluster/config.rs

//! Defines the retry and redirection settings of the cluster router.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The `[cluster]` section of the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// How many times a command may be retried or redirected.
    /// `-1` means unlimited, `0` means the command is attempted exactly once.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: i64,
    /// The backoff before the first retry. It doubles on every further retry.
    #[serde(with = "humantime_serde", default = "default_retry_interval")]
    pub retry_interval: Duration,
    /// If `true`, a failed node or a `MOVED` reply triggers a full `CLUSTER SLOTS`
    /// refresh instead of patching a single slot.
    #[serde(default = "default_refresh_on_moved")]
    pub refresh_on_moved: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            retry_limit: default_retry_limit(),
            retry_interval: default_retry_interval(),
            refresh_on_moved: default_refresh_on_moved(),
        }
    }
}

fn default_retry_limit() -> i64 {
    5
}
fn default_retry_interval() -> Duration {
    Duration::from_millis(10)
}
fn default_refresh_on_moved() -> bool {
    true
}

/// The retry budget shared by connection failures, `CLUSTERDOWN` replies and redirections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryLimit {
    Unlimited,
    Limited(u32),
}

impl RetryLimit {
    /// Converts the signed configuration knob. Anything below `-1` is rejected.
    pub fn from_config(value: i64) -> Option<Self> {
        match value {
            -1 => Some(RetryLimit::Unlimited),
            v if v >= 0 => Some(RetryLimit::Limited(u32::try_from(v).unwrap_or(u32::MAX))),
            _ => None,
        }
    }

    /// Returns `true` if another retry is allowed after `used` retries.
    pub fn allows(&self, used: u32) -> bool {
        match self {
            RetryLimit::Unlimited => true,
            RetryLimit::Limited(limit) => used < *limit,
        }
    }
}

/// The runtime form of [`ClusterConfig`] held by a router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterOptions {
    pub retry_limit: RetryLimit,
    pub retry_interval: Duration,
    pub refresh_on_moved: bool,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            retry_limit: RetryLimit::Limited(5),
            retry_interval: default_retry_interval(),
            refresh_on_moved: true,
        }
    }
}

impl ClusterOptions {
    /// The delay before retry number `retry` (1-based): `interval * 2^(retry - 1)`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.retry_interval.saturating_mul(1 << exponent)
    }
}

impl TryFrom<&ClusterConfig> for ClusterOptions {
    type Error = String;

    fn try_from(config: &ClusterConfig) -> Result<Self, Self::Error> {
        let retry_limit = RetryLimit::from_config(config.retry_limit).ok_or_else(|| {
            format!(
                "cluster.retry_limit must be -1 or greater, got {}",
                config.retry_limit
            )
        })?;
        Ok(Self {
            retry_limit,
            retry_interval: config.retry_interval,
            refresh_on_moved: config.refresh_on_moved,
        })
    }
}
