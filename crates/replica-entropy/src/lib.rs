#![deny(clippy::dbg_macro)]
#![deny(clippy::todo)]
#![allow(missing_docs)]
//! # Replica Entropy - repair stream receiver
//!
//! Receives anti-entropy repair batches from a peer and applies every record
//! to the local storage engine over its native protocol:
//! - Cipher codec for sealed (AES-256-GCM) chunks
//! - Plain and sealed frame codecs behind one [`FrameCodec`] trait
//! - Storage uplink connector with a scoped per-batch session
//! - Batch receiver and the matching batch encoder
//!
//! ## Design Principles
//!
//! - **Whole-batch status**: any failure aborts the batch, no partial success
//! - **Ordered apply**: records reach storage in arrival order
//! - **Fail closed**: declared lengths are checked before any copy
//! - **Scoped uplink**: the storage connection is released on every exit path

pub mod cipher;
pub mod config;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod prelude;
pub mod receiver;
pub mod uplink;

pub use cipher::{CipherCodec, CipherError, CipherKey};
pub use config::EntropyConfig;
pub use encoder::BatchEncoder;
pub use error::{EntropyError, EntropyResult, StreamStage};
pub use frame::{FrameCodec, FrameMode, PlainFrames, SealedFrames};
pub use receiver::{BatchReport, EntropyReceiver};
pub use uplink::{LoopbackUplink, StorageUplink, UplinkSession, DEFAULT_UPLINK_PORT};
