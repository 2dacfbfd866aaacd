// src/config.rs

//! Manages router configuration: loading from TOML and validation.

use crate::connection::NodeAddress;
use crate::core::cluster::slot_map::parse_slot_hints;
use crate::core::cluster::{ClusterConfig, ClusterOptions};
use crate::core::pool::NodeOptions;
use crate::core::sharding::RingHash;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Settings for the consistent hash ring of the sharded router.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ShardingConfig {
    /// Points per node at the default weight.
    #[serde(default = "default_replicas")]
    pub replicas: u32,
    #[serde(default = "default_weight")]
    pub default_weight: u32,
    #[serde(default)]
    pub hash: RingHash,
}

impl Default for ShardingConfig {
    fn default() -> Self {
        Self {
            replicas: default_replicas(),
            default_weight: default_weight(),
            hash: RingHash::default(),
        }
    }
}

fn default_replicas() -> u32 {
    crate::core::sharding::DEFAULT_REPLICAS
}
fn default_weight() -> u32 {
    crate::core::sharding::DEFAULT_WEIGHT
}

/// Timeouts applied by the bundled TCP connection.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ConnectionConfig {
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_read_timeout")]
    pub read_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_write_timeout")]
    pub write_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
            write_timeout: default_write_timeout(),
        }
    }
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(2)
}
fn default_read_timeout() -> Duration {
    Duration::from_secs(3)
}
fn default_write_timeout() -> Duration {
    Duration::from_secs(2)
}

/// One `[[nodes]]` entry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    pub alias: Option<String>,
    /// Share of the hash ring, relative to `sharding.default_weight`.
    pub weight: Option<u32>,
    /// Static slot hints, e.g. `"0-5460,5461"`.
    pub slots: Option<String>,
}

impl NodeConfig {
    pub fn address(&self) -> NodeAddress {
        NodeAddress::new(self.host.clone(), self.port)
    }

    pub fn options(&self) -> NodeOptions {
        NodeOptions {
            alias: self.alias.clone(),
            weight: self.weight,
            slots: self.slots.clone(),
        }
    }
}

/// The complete, validated router configuration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    /// Advisory log level for applications that install a subscriber.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub sharding: ShardingConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            cluster: ClusterConfig::default(),
            sharding: ShardingConfig::default(),
            connection: ConnectionConfig::default(),
            nodes: Vec::new(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{}'", path.display()))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Invalid config file '{}'", path.display()))?;
        Ok(config)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        ClusterOptions::try_from(&self.cluster).map_err(|e| anyhow!(e))?;
        if self.cluster.retry_interval.is_zero() {
            warn!("cluster.retry_interval is 0: retries will not back off");
        }

        if self.sharding.replicas == 0 {
            return Err(anyhow!("sharding.replicas cannot be 0"));
        }
        if self.sharding.default_weight == 0 {
            return Err(anyhow!("sharding.default_weight cannot be 0"));
        }

        let mut addresses = HashSet::new();
        let mut aliases = HashSet::new();
        for (i, node) in self.nodes.iter().enumerate() {
            let n = i + 1;
            if node.host.trim().is_empty() {
                return Err(anyhow!("node #{n}: host cannot be empty"));
            }
            if node.port == 0 {
                return Err(anyhow!("node #{n}: port cannot be 0"));
            }
            if !addresses.insert(node.address()) {
                return Err(anyhow!("node #{n}: duplicate address {}", node.address()));
            }
            if let Some(alias) = &node.alias
                && !aliases.insert(alias.as_str())
            {
                return Err(anyhow!("node #{n}: duplicate alias '{alias}'"));
            }
            if node.weight == Some(0) {
                return Err(anyhow!("node #{n}: weight cannot be 0"));
            }
            if let Some(slots) = &node.slots {
                parse_slot_hints(slots)
                    .with_context(|| format!("node #{n}: invalid slot hints '{slots}'"))?;
            }
        }
        Ok(())
    }
}
