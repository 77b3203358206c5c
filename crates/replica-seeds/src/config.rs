//! Seed poller configuration.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Query name used when neither the environment nor the config names one
pub const DEFAULT_TXT_NAME: &str = "_replica.ec2-internal";
/// Environment variable that overrides the configured query name
pub const TXT_NAME_ENV: &str = "REPLICA_DNS_TXT_NAME";
/// Minimum spacing between DNS queries
pub const DEFAULT_MIN_INTERVAL_MS: u64 = 30_000;
/// Time allowed for one resolver round trip
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedsConfig {
    /// TXT record holding the seed list
    pub txt_name: Option<String>,
    pub min_interval_ms: u64,
    /// Resolver to query; the first `/etc/resolv.conf` nameserver when unset
    pub resolver: Option<SocketAddr>,
    pub query_timeout_ms: u64,
}

impl Default for SeedsConfig {
    fn default() -> Self {
        Self {
            txt_name: None,
            min_interval_ms: DEFAULT_MIN_INTERVAL_MS,
            resolver: None,
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
        }
    }
}

impl SeedsConfig {
    /// Query name with the process environment applied
    pub fn resolve_txt_name(&self) -> String {
        self.resolve_txt_name_with(|key| std::env::var(key).ok())
    }

    /// Query name with `lookup` standing in for the environment
    ///
    /// Precedence: environment, then `txt_name`, then [`DEFAULT_TXT_NAME`].
    /// Empty values are ignored.
    pub fn resolve_txt_name_with<F>(&self, lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup(TXT_NAME_ENV)
            .filter(|name| !name.is_empty())
            .or_else(|| self.txt_name.clone().filter(|name| !name.is_empty()))
            .unwrap_or_else(|| DEFAULT_TXT_NAME.to_string())
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}
