//! Seed discovery errors
//!
//! None of these escape the poller as hard failures; they are reported
//! through [`crate::PollOutcome::Failed`].

/// DNS-layer failures while fetching seeds
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SeedError {
    /// Query name cannot be encoded
    #[error("Invalid query name '{name}': {reason}")]
    InvalidName {
        /// Name as configured
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// No resolver address could be determined
    #[error("No DNS resolver available: {0}")]
    NoResolver(String),

    /// Socket-level failure sending or receiving
    #[error("DNS query failed: {0}")]
    Query(String),

    /// Resolver did not answer in time
    #[error("DNS query timed out after {timeout_ms}ms")]
    Timeout {
        /// Configured timeout
        timeout_ms: u64,
    },

    /// Response exceeded the accepted size
    #[error("DNS reply is too large: {len} bytes, limit {limit}")]
    ResponseTooLarge {
        /// Bytes received
        len: usize,
        /// Accepted maximum
        limit: usize,
    },

    /// Response had the TC bit set
    #[error("DNS reply was truncated")]
    Truncated,

    /// Response does not answer our query
    #[error("DNS reply id {actual:#06x} does not match query id {expected:#06x}")]
    IdMismatch {
        /// Id sent
        expected: u16,
        /// Id received
        actual: u16,
    },

    /// Non-zero response code
    #[error("DNS reply code {0}")]
    ResponseCode(u8),

    /// Response could not be parsed
    #[error("Malformed DNS reply: {0}")]
    Malformed(String),
}

impl SeedError {
    /// Create a malformed-response error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }
}
