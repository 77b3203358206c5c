//! Entropy receiver configuration.

use crate::cipher::{CipherCodec, CipherKey};
use crate::error::{EntropyError, EntropyResult};
use crate::frame::MIN_WORD_CHUNK;
use crate::uplink::DEFAULT_UPLINK_PORT;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Staging buffer capacity: the largest record a batch may carry
pub const DEFAULT_BUFFER_CAPACITY: usize = 16 * 1024;
/// Sealed record chunk size, sized so a full staging buffer fits one chunk
pub const DEFAULT_CIPHER_CHUNK_SIZE: usize = DEFAULT_BUFFER_CAPACITY + crate::cipher::SEALED_OVERHEAD;
/// Header size knob kept for configuration compatibility
pub const DEFAULT_HEADER_SIZE: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntropyConfig {
    /// Expect sealed frames from peers
    pub encryption: bool,
    /// Accepted but not used for framing; a sealed count occupies one cipher chunk
    pub header_size: usize,
    pub buffer_capacity: usize,
    pub cipher_chunk_size: usize,
    /// Loopback port of the storage engine
    pub uplink_port: u16,
    /// Hex-encoded 32-byte key, required when `encryption` is set
    pub key_file: Option<PathBuf>,
}

impl Default for EntropyConfig {
    fn default() -> Self {
        Self {
            encryption: false,
            header_size: DEFAULT_HEADER_SIZE,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            cipher_chunk_size: DEFAULT_CIPHER_CHUNK_SIZE,
            uplink_port: DEFAULT_UPLINK_PORT,
            key_file: None,
        }
    }
}

impl EntropyConfig {
    /// Check sizes and key presence
    pub fn validate(&self) -> EntropyResult<()> {
        if self.buffer_capacity == 0 {
            return Err(EntropyError::config("buffer_capacity must be non-zero"));
        }
        if self.buffer_capacity > i32::MAX as usize {
            return Err(EntropyError::config(
                "buffer_capacity exceeds the largest declarable record",
            ));
        }
        if !self.encryption {
            return Ok(());
        }

        if self.cipher_chunk_size < MIN_WORD_CHUNK {
            return Err(EntropyError::config(format!(
                "cipher_chunk_size {} is below the sealed minimum of {}",
                self.cipher_chunk_size, MIN_WORD_CHUNK
            )));
        }
        if self.key_file.is_none() {
            return Err(EntropyError::config(
                "encryption is enabled but no key_file is configured",
            ));
        }

        let per_chunk = CipherCodec::max_plaintext(self.cipher_chunk_size);
        if per_chunk < self.buffer_capacity {
            tracing::warn!(
                per_chunk,
                buffer_capacity = self.buffer_capacity,
                "Sealed records above the chunk plaintext capacity will be rejected"
            );
        }
        Ok(())
    }

    /// Load the cipher codec when encryption is enabled
    pub fn load_cipher(&self) -> EntropyResult<Option<Arc<CipherCodec>>> {
        if !self.encryption {
            return Ok(None);
        }
        let path = self.key_file.as_ref().ok_or_else(|| {
            EntropyError::config("encryption is enabled but no key_file is configured")
        })?;
        let key = CipherKey::from_file(path).map_err(|e| {
            EntropyError::config(format!("key file {}: {}", path.display(), e))
        })?;
        Ok(Some(Arc::new(CipherCodec::new(key))))
    }
}
