//! Repair-stream framing
//!
//! The receiver loop is written once against [`FrameCodec`]. A codec only
//! says how many wire bytes each frame occupies and how to decode them;
//! the receiver owns every read.
//!
//! Plain:  `[count: 4][len: 4][payload: len]...`
//! Sealed: `[count chunk][len chunk][payload chunk]...`, every chunk `chunk_size` bytes

use crate::cipher::{CipherCodec, CipherError, SEALED_OVERHEAD};
use crate::error::{EntropyError, EntropyResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Width of the big-endian count and length fields
pub const WORD_LEN: usize = 4;

/// Smallest sealed chunk able to carry a count or length word
pub const MIN_WORD_CHUNK: usize = SEALED_OVERHEAD + WORD_LEN;

/// Wire format of one repair batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameMode {
    /// Raw big-endian words and payloads
    Plain,
    /// Every frame is a fixed-size sealed chunk
    Sealed,
}

impl fmt::Display for FrameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameMode::Plain => f.write_str("plain"),
            FrameMode::Sealed => f.write_str("sealed"),
        }
    }
}

/// Decoder for one of the two repair-stream wire formats
pub trait FrameCodec: Send + Sync {
    /// Wire format implemented by this codec
    fn mode(&self) -> FrameMode;

    /// One-time setup before the first frame of a batch
    fn prepare(&self) -> EntropyResult<()> {
        Ok(())
    }

    /// Wire bytes of the batch header
    fn header_frame_len(&self) -> usize;

    /// Wire bytes of a record length frame
    fn length_frame_len(&self) -> usize;

    /// Wire bytes of a payload frame for a record of `declared` bytes
    fn payload_frame_len(&self, declared: usize) -> usize;

    /// Decode a header or length frame into the signed word it carries
    fn decode_word(&self, frame: &[u8]) -> EntropyResult<i32>;

    /// Decode a payload frame into `staging`, returning the bytes written
    fn decode_payload(&self, frame: &[u8], staging: &mut [u8]) -> EntropyResult<usize>;
}

fn word_from(bytes: &[u8]) -> EntropyResult<i32> {
    let mut word = [0u8; WORD_LEN];
    match bytes.get(..WORD_LEN) {
        Some(prefix) => word.copy_from_slice(prefix),
        None => {
            return Err(EntropyError::protocol(format!(
                "word frame holds {} bytes, need {}",
                bytes.len(),
                WORD_LEN
            )))
        }
    }
    Ok(i32::from_be_bytes(word))
}

/// Unencrypted framing
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainFrames;

impl FrameCodec for PlainFrames {
    fn mode(&self) -> FrameMode {
        FrameMode::Plain
    }

    fn prepare(&self) -> EntropyResult<()> {
        tracing::debug!("Encryption is disabled for entropy receiver");
        Ok(())
    }

    fn header_frame_len(&self) -> usize {
        WORD_LEN
    }

    fn length_frame_len(&self) -> usize {
        WORD_LEN
    }

    fn payload_frame_len(&self, declared: usize) -> usize {
        declared
    }

    fn decode_word(&self, frame: &[u8]) -> EntropyResult<i32> {
        word_from(frame)
    }

    fn decode_payload(&self, frame: &[u8], staging: &mut [u8]) -> EntropyResult<usize> {
        let capacity = staging.len();
        let target = staging.get_mut(..frame.len()).ok_or_else(|| {
            EntropyError::protocol(format!(
                "payload of {} bytes exceeds staging capacity {}",
                frame.len(),
                capacity
            ))
        })?;
        target.copy_from_slice(frame);
        Ok(frame.len())
    }
}

/// Encrypted framing over a shared [`CipherCodec`]
#[derive(Debug, Clone)]
pub struct SealedFrames {
    codec: Arc<CipherCodec>,
    chunk_size: usize,
}

impl SealedFrames {
    /// Create sealed framing; the chunk must fit a sealed word
    pub fn new(codec: Arc<CipherCodec>, chunk_size: usize) -> EntropyResult<Self> {
        if chunk_size < MIN_WORD_CHUNK {
            return Err(EntropyError::config(format!(
                "cipher_chunk_size {} is below the sealed minimum of {}",
                chunk_size, MIN_WORD_CHUNK
            )));
        }
        Ok(Self { codec, chunk_size })
    }

    /// Cipher chunk size used for every frame
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl FrameCodec for SealedFrames {
    fn mode(&self) -> FrameMode {
        FrameMode::Sealed
    }

    fn prepare(&self) -> EntropyResult<()> {
        self.codec.init()?;
        Ok(())
    }

    fn header_frame_len(&self) -> usize {
        self.chunk_size
    }

    fn length_frame_len(&self) -> usize {
        self.chunk_size
    }

    fn payload_frame_len(&self, _declared: usize) -> usize {
        self.chunk_size
    }

    fn decode_word(&self, frame: &[u8]) -> EntropyResult<i32> {
        let plain = self
            .codec
            .decrypt(frame, CipherCodec::max_plaintext(frame.len()))?;
        if plain.len() < WORD_LEN {
            return Err(CipherError::ShortOutput {
                len: plain.len(),
                minimum: WORD_LEN,
            }
            .into());
        }
        word_from(&plain)
    }

    fn decode_payload(&self, frame: &[u8], staging: &mut [u8]) -> EntropyResult<usize> {
        let plain = self.codec.decrypt(frame, staging.len())?;
        staging[..plain.len()].copy_from_slice(&plain);
        Ok(plain.len())
    }
}
