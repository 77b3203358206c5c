//! Entropy receiver errors
//!
//! Every variant is terminal for the batch being received. Nothing here is
//! retried internally; the caller decides whether to ask the peer again.

use crate::cipher::CipherError;
use std::fmt;
use std::io;

/// Section of the repair stream being handled when an I/O failure occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStage {
    /// Batch header carrying the record count
    Header,
    /// Length frame preceding a record
    RecordLength,
    /// Record payload frame
    RecordPayload,
    /// Forwarding a record to the storage uplink
    UplinkWrite,
}

impl fmt::Display for StreamStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            StreamStage::Header => "batch header",
            StreamStage::RecordLength => "record length",
            StreamStage::RecordPayload => "record payload",
            StreamStage::UplinkWrite => "storage uplink write",
        };
        f.write_str(stage)
    }
}

/// Entropy receiver errors
#[derive(Debug, thiserror::Error)]
pub enum EntropyError {
    /// Malformed header, count, or record length
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Peer announced a batch with zero records
    #[error("Peer announced an empty repair batch")]
    EmptyBatch,

    /// Cipher rejected a chunk or produced unusable output
    #[error("Cipher error: {0}")]
    Decrypt(#[from] CipherError),

    /// Short or failed read/write on either connection
    #[error("I/O failure on {stage}: {source}")]
    Io {
        /// Where in the stream the failure happened
        stage: StreamStage,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// Storage engine listener could not be reached
    #[error("Storage uplink unavailable at {endpoint}: {reason}")]
    UplinkUnavailable {
        /// Address the connector tried
        endpoint: String,
        /// Socket-level reason
        reason: String,
    },

    /// Receiver configuration is unusable
    #[error("Invalid entropy configuration: {0}")]
    Config(String),
}

impl EntropyError {
    /// Create a protocol error
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol(reason.into())
    }

    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config(reason.into())
    }

    /// Wrap an I/O error with the stream stage it happened on
    pub fn io(stage: StreamStage, source: io::Error) -> Self {
        Self::Io { stage, source }
    }

    /// Short stable label for log fields
    pub fn kind(&self) -> &'static str {
        match self {
            EntropyError::Protocol(_) => "protocol",
            EntropyError::EmptyBatch => "empty_batch",
            EntropyError::Decrypt(_) => "decrypt",
            EntropyError::Io { .. } => "io",
            EntropyError::UplinkUnavailable { .. } => "uplink_unavailable",
            EntropyError::Config(_) => "config",
        }
    }
}

/// Result alias for entropy operations
pub type EntropyResult<T> = Result<T, EntropyError>;
