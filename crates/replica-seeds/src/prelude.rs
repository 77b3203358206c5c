//! Replica seeds prelude.

pub use crate::{DnsExchange, PollOutcome, SeedError, SeedPoller, SeedsConfig, UdpExchange};
