//! Cipher codec for sealed repair-stream chunks
//!
//! A sealed chunk always occupies exactly the configured chunk size on the
//! wire so the receiver never needs an outer length to find chunk
//! boundaries:
//!
//! ```text
//! [ nonce: 12 ][ AES-256-GCM( body ) || tag: 16 ]
//! body = [ plaintext length: u32 BE ][ plaintext ][ zero padding ]
//! ```
//!
//! The codec reports the real plaintext length recovered from the body;
//! callers must use it instead of assuming the chunk was full.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use once_cell::sync::OnceCell;
use rand::RngCore;
use std::fmt;
use std::path::Path;
use zeroize::Zeroizing;

/// AES-GCM nonce length prepended to every chunk
pub const NONCE_LEN: usize = 12;
/// AES-GCM authentication tag length
pub const TAG_LEN: usize = 16;
/// Key length for AES-256
pub const KEY_LEN: usize = 32;

const LENGTH_PREFIX_LEN: usize = 4;

/// Bytes of every sealed chunk not available to plaintext
pub const SEALED_OVERHEAD: usize = NONCE_LEN + TAG_LEN + LENGTH_PREFIX_LEN;

/// Cipher codec errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CipherError {
    /// Key material could not be loaded or has the wrong size
    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    /// Chunk too small to hold nonce, tag, and length prefix
    #[error("Sealed chunk of {actual} bytes is below the {minimum}-byte minimum")]
    TruncatedChunk {
        /// Size received or requested
        actual: usize,
        /// Smallest usable chunk
        minimum: usize,
    },

    /// Authentication failed (wrong key, tampered or misaligned chunk)
    #[error("Chunk rejected by cipher")]
    Rejected,

    /// Decrypted body declares more plaintext than it carries
    #[error("Decrypted body declares {declared} bytes but only holds {available}")]
    MalformedBody {
        /// Length found in the body prefix
        declared: usize,
        /// Bytes actually present after the prefix
        available: usize,
    },

    /// Plaintext does not fit the caller's limit
    #[error("Plaintext of {len} bytes exceeds the {limit}-byte limit")]
    Oversized {
        /// Plaintext length
        len: usize,
        /// Permitted maximum
        limit: usize,
    },

    /// Decrypted output too short to carry a length or count field
    #[error("Decrypted output of {len} bytes cannot hold a {minimum}-byte field")]
    ShortOutput {
        /// Plaintext length recovered
        len: usize,
        /// Required minimum
        minimum: usize,
    },

    /// Underlying AEAD refused to encrypt
    #[error("Encryption failed")]
    SealFailed,
}

/// 256-bit key shared by the peers of one cluster
pub struct CipherKey(Zeroizing<[u8; KEY_LEN]>);

impl CipherKey {
    /// Wrap raw key bytes
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Parse a hex-encoded key, ignoring surrounding whitespace
    pub fn from_hex(encoded: &str) -> Result<Self, CipherError> {
        let decoded = Zeroizing::new(
            hex::decode(encoded.trim())
                .map_err(|e| CipherError::InvalidKey(format!("Invalid hex: {}", e)))?,
        );
        if decoded.len() != KEY_LEN {
            return Err(CipherError::InvalidKey(format!(
                "Expected {} key bytes, got {}",
                KEY_LEN,
                decoded.len()
            )));
        }
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(&decoded);
        Ok(Self(key))
    }

    /// Read a hex-encoded key file
    pub fn from_file(path: &Path) -> Result<Self, CipherError> {
        let contents = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
            CipherError::InvalidKey(format!("Failed to read {}: {}", path.display(), e))
        })?);
        Self::from_hex(&contents)
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CipherKey(..)")
    }
}

/// Block cipher wrapper used for every sealed chunk
///
/// The AEAD state is built on the first [`init`](Self::init) and reused by
/// every later call. One codec is normally shared by `Arc` across all
/// receivers of a process.
pub struct CipherCodec {
    key: CipherKey,
    cipher: OnceCell<Aes256Gcm>,
}

impl CipherCodec {
    /// Create an uninitialized codec
    pub fn new(key: CipherKey) -> Self {
        Self {
            key,
            cipher: OnceCell::new(),
        }
    }

    /// Largest plaintext a chunk of `chunk_size` bytes can carry
    pub fn max_plaintext(chunk_size: usize) -> usize {
        chunk_size.saturating_sub(SEALED_OVERHEAD)
    }

    /// Whether [`init`](Self::init) has already run
    pub fn is_initialized(&self) -> bool {
        self.cipher.get().is_some()
    }

    /// Set up the cipher state; later calls are no-ops
    pub fn init(&self) -> Result<&Aes256Gcm, CipherError> {
        self.cipher.get_or_try_init(|| {
            tracing::info!("Initializing entropy cipher");
            Aes256Gcm::new_from_slice(self.key.0.as_slice())
                .map_err(|e| CipherError::InvalidKey(e.to_string()))
        })
    }

    /// Open one sealed chunk, returning at most `max_output_len` plaintext bytes
    pub fn decrypt(&self, chunk: &[u8], max_output_len: usize) -> Result<Vec<u8>, CipherError> {
        if chunk.len() < SEALED_OVERHEAD {
            return Err(CipherError::TruncatedChunk {
                actual: chunk.len(),
                minimum: SEALED_OVERHEAD,
            });
        }

        let cipher = self.init()?;
        let (nonce, sealed) = chunk.split_at(NONCE_LEN);
        let body = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(nonce), sealed)
                .map_err(|_| CipherError::Rejected)?,
        );

        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        prefix.copy_from_slice(&body[..LENGTH_PREFIX_LEN]);
        let declared = u32::from_be_bytes(prefix) as usize;
        let available = body.len() - LENGTH_PREFIX_LEN;

        if declared > available {
            return Err(CipherError::MalformedBody {
                declared,
                available,
            });
        }
        if declared > max_output_len {
            return Err(CipherError::Oversized {
                len: declared,
                limit: max_output_len,
            });
        }

        Ok(body[LENGTH_PREFIX_LEN..LENGTH_PREFIX_LEN + declared].to_vec())
    }

    /// Seal `plaintext` into a chunk of exactly `chunk_size` bytes with a fresh nonce
    pub fn seal(&self, plaintext: &[u8], chunk_size: usize) -> Result<Vec<u8>, CipherError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        self.seal_with_nonce(plaintext, chunk_size, nonce)
    }

    /// Seal with a caller-chosen nonce. Never reuse a nonce under one key.
    pub fn seal_with_nonce(
        &self,
        plaintext: &[u8],
        chunk_size: usize,
        nonce: [u8; NONCE_LEN],
    ) -> Result<Vec<u8>, CipherError> {
        if chunk_size < SEALED_OVERHEAD {
            return Err(CipherError::TruncatedChunk {
                actual: chunk_size,
                minimum: SEALED_OVERHEAD,
            });
        }
        let limit = Self::max_plaintext(chunk_size);
        if plaintext.len() > limit {
            return Err(CipherError::Oversized {
                len: plaintext.len(),
                limit,
            });
        }

        let cipher = self.init()?;
        let mut body = Zeroizing::new(vec![0u8; chunk_size - NONCE_LEN - TAG_LEN]);
        body[..LENGTH_PREFIX_LEN].copy_from_slice(&(plaintext.len() as u32).to_be_bytes());
        body[LENGTH_PREFIX_LEN..LENGTH_PREFIX_LEN + plaintext.len()].copy_from_slice(plaintext);

        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), body.as_slice())
            .map_err(|_| CipherError::SealFailed)?;

        let mut chunk = Vec::with_capacity(chunk_size);
        chunk.extend_from_slice(&nonce);
        chunk.extend_from_slice(&sealed);
        debug_assert_eq!(chunk.len(), chunk_size);
        Ok(chunk)
    }
}

impl fmt::Debug for CipherCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherCodec")
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}
