//! Replica entropy prelude.
//!
//! Curated re-exports for hosts wiring a receiver.

pub use crate::{
    BatchEncoder, BatchReport, CipherCodec, CipherKey, EntropyConfig, EntropyError,
    EntropyReceiver, FrameMode, LoopbackUplink, StorageUplink,
};
