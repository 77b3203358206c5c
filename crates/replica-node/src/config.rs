//! Node configuration
//!
//! One TOML file with an `[entropy]` and a `[seeds]` table. A missing file
//! means all defaults. `REPLICA_*` environment variables are applied on top.

use anyhow::{Context, Result};
use replica_entropy::EntropyConfig;
use replica_seeds::SeedsConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Default entropy listener address
pub const DEFAULT_LISTEN: &str = "0.0.0.0:8105";

/// Enables or disables sealed frames
pub const ENCRYPTION_ENV: &str = "REPLICA_ENTROPY_ENCRYPTION";
/// Overrides the entropy listener address
pub const LISTEN_ENV: &str = "REPLICA_LISTEN";
/// Overrides the storage engine port
pub const UPLINK_PORT_ENV: &str = "REPLICA_UPLINK_PORT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Address peers connect to with repair batches
    pub listen: SocketAddr,
    pub entropy: EntropyConfig,
    pub seeds: SeedsConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8105)),
            entropy: EntropyConfig::default(),
            seeds: SeedsConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load from `path`, falling back to defaults when the file is absent
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply `REPLICA_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply `REPLICA_*` overrides with `lookup` standing in for the environment
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENCRYPTION_ENV) {
            self.entropy.encryption = parse_flag(&value)
                .with_context(|| format!("{} must be a boolean, got '{}'", ENCRYPTION_ENV, value))?;
        }
        if let Some(value) = lookup(LISTEN_ENV) {
            self.listen = value
                .parse()
                .with_context(|| format!("{} must be an address, got '{}'", LISTEN_ENV, value))?;
        }
        if let Some(value) = lookup(UPLINK_PORT_ENV) {
            self.entropy.uplink_port = value
                .parse()
                .with_context(|| format!("{} must be a port, got '{}'", UPLINK_PORT_ENV, value))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.entropy.validate()?;
        if self.seeds.query_timeout_ms == 0 {
            anyhow::bail!("seeds.query_timeout_ms must be non-zero");
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
