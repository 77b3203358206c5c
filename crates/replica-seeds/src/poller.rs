//! Interval-gated seed poller
//!
//! Each [`SeedPoller::poll`] call either skips (too soon since the last
//! check), or issues one TXT query and compares the concatenated answer
//! against the hash of the last accepted seed set. Failures never escape as
//! errors; they surface as [`PollOutcome::Failed`] and the caller's buffer is
//! left untouched.

use crate::config::SeedsConfig;
use crate::dns::{build_txt_query, parse_txt_response};
use crate::error::SeedError;
use crate::hash::seed_hash;
use crate::resolver::{DnsExchange, UdpExchange};
use std::time::Duration;
use tokio::time::Instant;

/// Result of one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// New seed set written to the caller's buffer
    Updated,
    /// Seed set identical to the last accepted one; buffer rewritten with the same content
    Unchanged,
    /// Previous check was too recent; DNS was not queried
    RateLimited,
    /// DNS failed; buffer untouched
    Failed(SeedError),
}

impl PollOutcome {
    /// Whether the caller should re-process its seed buffer
    pub fn is_updated(&self) -> bool {
        matches!(self, PollOutcome::Updated)
    }
}

/// Polls one TXT record for cluster seeds
pub struct SeedPoller<X> {
    exchange: X,
    txt_name: String,
    min_interval: Duration,
    last_checked: Option<Instant>,
    last_hash: Option<u32>,
}

impl SeedPoller<UdpExchange> {
    /// Build a UDP poller from configuration and the process environment
    pub fn from_config(config: &SeedsConfig) -> Result<Self, SeedError> {
        let exchange = match config.resolver {
            Some(resolver) => UdpExchange::new(resolver, config.query_timeout()),
            None => UdpExchange::system(config.query_timeout())?,
        };
        Ok(Self::new(
            exchange,
            config.resolve_txt_name(),
            config.min_interval(),
        ))
    }
}

impl<X: DnsExchange> SeedPoller<X> {
    pub fn new(exchange: X, txt_name: impl Into<String>, min_interval: Duration) -> Self {
        Self {
            exchange,
            txt_name: txt_name.into(),
            min_interval,
            last_checked: None,
            last_hash: None,
        }
    }

    pub fn txt_name(&self) -> &str {
        &self.txt_name
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Hash of the last accepted seed set
    pub fn last_hash(&self) -> Option<u32> {
        self.last_hash
    }

    pub fn exchange(&self) -> &X {
        &self.exchange
    }

    /// Check for a new seed set, writing it into `seeds` when one arrives
    pub async fn poll(&mut self, seeds: &mut Vec<u8>) -> PollOutcome {
        if !self.check_due(Instant::now()) {
            tracing::trace!(txt_name = %self.txt_name, "Seed check skipped, interval not elapsed");
            return PollOutcome::RateLimited;
        }

        let fetched = match self.fetch().await {
            Ok(fetched) => fetched,
            Err(error) => {
                tracing::warn!(txt_name = %self.txt_name, %error, "Seed lookup failed");
                return PollOutcome::Failed(error);
            }
        };

        let hash = seed_hash(&fetched);
        seeds.clear();
        seeds.extend_from_slice(&fetched);

        if self.last_hash == Some(hash) {
            tracing::debug!(txt_name = %self.txt_name, hash, "Seed set unchanged");
            return PollOutcome::Unchanged;
        }

        tracing::info!(
            txt_name = %self.txt_name,
            hash,
            previous = ?self.last_hash,
            len = seeds.len(),
            "Seed set updated"
        );
        self.last_hash = Some(hash);
        PollOutcome::Updated
    }

    /// Record a check at `now` if the interval has strictly elapsed
    fn check_due(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_checked {
            if now.saturating_duration_since(last) <= self.min_interval {
                return false;
            }
        }
        self.last_checked = Some(now);
        true
    }

    async fn fetch(&self) -> Result<Vec<u8>, SeedError> {
        let id: u16 = rand::random();
        let query = build_txt_query(id, &self.txt_name)?;
        let response = self.exchange.exchange(&query).await?;
        parse_txt_response(id, &response)
    }
}
