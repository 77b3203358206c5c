//! Repair batch encoder
//!
//! Sender side of the framing in [`crate::frame`]. Peers pushing repairs
//! build their stream with it; the receiver tests use it to produce
//! sealed and plain batches with identical logical content.

use crate::cipher::CipherCodec;
use crate::error::{EntropyError, EntropyResult};
use crate::frame::{FrameMode, WORD_LEN};
use std::sync::Arc;

/// Builds repair batches in either wire format
#[derive(Debug, Clone)]
pub enum BatchEncoder {
    /// Raw big-endian words and payloads
    Plain,
    /// Fixed-size sealed chunks
    Sealed {
        /// Shared cipher
        codec: Arc<CipherCodec>,
        /// Size of every count, length and payload chunk
        chunk_size: usize,
    },
}

impl BatchEncoder {
    /// Plain framing
    pub fn plain() -> Self {
        BatchEncoder::Plain
    }

    /// Sealed framing
    pub fn sealed(codec: Arc<CipherCodec>, chunk_size: usize) -> Self {
        BatchEncoder::Sealed { codec, chunk_size }
    }

    /// Wire format produced
    pub fn mode(&self) -> FrameMode {
        match self {
            BatchEncoder::Plain => FrameMode::Plain,
            BatchEncoder::Sealed { .. } => FrameMode::Sealed,
        }
    }

    /// Encode a full batch: header followed by every record in order
    pub fn encode<I, R>(&self, records: I) -> EntropyResult<Vec<u8>>
    where
        I: IntoIterator<Item = R>,
        R: AsRef<[u8]>,
    {
        let records: Vec<R> = records.into_iter().collect();
        let count = i32::try_from(records.len())
            .map_err(|_| EntropyError::protocol("too many records for one batch"))?;

        let mut out = self.encode_count(count)?;
        for record in &records {
            out.extend_from_slice(&self.encode_record(record.as_ref())?);
        }
        Ok(out)
    }

    /// Encode only the batch header
    pub fn encode_count(&self, count: i32) -> EntropyResult<Vec<u8>> {
        match self {
            BatchEncoder::Plain => Ok(count.to_be_bytes().to_vec()),
            BatchEncoder::Sealed { codec, chunk_size } => {
                Ok(codec.seal(&count.to_be_bytes(), *chunk_size)?)
            }
        }
    }

    /// Encode one length frame plus payload frame
    pub fn encode_record(&self, record: &[u8]) -> EntropyResult<Vec<u8>> {
        let length = i32::try_from(record.len())
            .map_err(|_| EntropyError::protocol("record too large to declare"))?;

        match self {
            BatchEncoder::Plain => {
                let mut out = Vec::with_capacity(WORD_LEN + record.len());
                out.extend_from_slice(&length.to_be_bytes());
                out.extend_from_slice(record);
                Ok(out)
            }
            BatchEncoder::Sealed { codec, chunk_size } => {
                let mut out = codec.seal(&length.to_be_bytes(), *chunk_size)?;
                out.extend_from_slice(&codec.seal(record, *chunk_size)?);
                Ok(out)
            }
        }
    }
}
