#![deny(clippy::dbg_macro)]
#![deny(clippy::todo)]
#![allow(missing_docs)]
//! # Replica Seeds - DNS TXT seed discovery
//!
//! Periodically reads the cluster seed list from a DNS TXT record:
//! - Minimal TXT query encoder and answer parser
//! - UDP resolver exchange behind the [`DnsExchange`] trait
//! - Interval-gated poller that deduplicates seed sets by content hash
//!
//! ## Design Principles
//!
//! - **Best effort**: DNS failures are reported as outcomes, never raised
//! - **Bounded**: replies above [`dns::MAX_RESPONSE_LEN`] are rejected
//! - **Quiet on repeats**: identical seed sets report [`PollOutcome::Unchanged`]

pub mod config;
pub mod dns;
pub mod error;
pub mod hash;
pub mod poller;
pub mod prelude;
pub mod resolver;

pub use config::{SeedsConfig, DEFAULT_TXT_NAME, TXT_NAME_ENV};
pub use error::SeedError;
pub use hash::seed_hash;
pub use poller::{PollOutcome, SeedPoller};
pub use resolver::{DnsExchange, UdpExchange};
