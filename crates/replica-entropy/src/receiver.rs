//! Entropy stream reader
//!
//! Receives one repair batch from a peer and applies each record, in
//! arrival order, to the storage engine through a [`StorageUplink`].
//!
//! A batch either completes or fails as a whole. Records forwarded before
//! a failure stay applied: storage has already consumed them, so callers
//! must tolerate at-least-once delivery when they retry.

use crate::cipher::CipherCodec;
use crate::config::EntropyConfig;
use crate::error::{EntropyError, EntropyResult, StreamStage};
use crate::frame::{FrameCodec, FrameMode, PlainFrames, SealedFrames};
use crate::uplink::{StorageUplink, UplinkSession};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

/// Outcome of a successfully applied batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// Records forwarded to storage
    pub records: u32,
    /// Payload bytes forwarded to storage
    pub bytes_forwarded: u64,
    /// Wire format the batch arrived in
    pub mode: FrameMode,
}

/// Receiver for anti-entropy repair batches
pub struct EntropyReceiver<U> {
    frames: Arc<dyn FrameCodec>,
    uplink: U,
    buffer_capacity: usize,
}

impl<U: StorageUplink> EntropyReceiver<U> {
    /// Create a receiver over an explicit frame codec
    pub fn new(frames: Arc<dyn FrameCodec>, uplink: U, buffer_capacity: usize) -> Self {
        Self {
            frames,
            uplink,
            buffer_capacity,
        }
    }

    /// Create a receiver whose framing follows `config.encryption`
    pub fn from_config(
        config: &EntropyConfig,
        cipher: Option<Arc<CipherCodec>>,
        uplink: U,
    ) -> EntropyResult<Self> {
        config.validate()?;

        let frames: Arc<dyn FrameCodec> = if config.encryption {
            let codec = cipher.ok_or_else(|| {
                EntropyError::config("encryption is enabled but no cipher codec was supplied")
            })?;
            Arc::new(SealedFrames::new(codec, config.cipher_chunk_size)?)
        } else {
            Arc::new(PlainFrames)
        };

        Ok(Self::new(frames, uplink, config.buffer_capacity))
    }

    /// Wire format this receiver expects
    pub fn mode(&self) -> FrameMode {
        self.frames.mode()
    }

    /// Storage connector in use
    pub fn uplink(&self) -> &U {
        &self.uplink
    }

    /// Receive one repair batch from `peer` and apply it to storage
    ///
    /// The peer connection stays owned by the caller. The storage
    /// connection is opened after the header validates and is closed
    /// before this returns, on success and on every failure.
    pub async fn receive_batch<P>(&self, peer: &mut P) -> EntropyResult<BatchReport>
    where
        P: AsyncRead + Unpin + Send + ?Sized,
    {
        let result = self.run_batch(peer).await;
        if let Err(e) = &result {
            tracing::error!(
                mode = %self.frames.mode(),
                kind = e.kind(),
                error = %e,
                "Repair batch aborted"
            );
        }
        result
    }

    async fn run_batch<P>(&self, peer: &mut P) -> EntropyResult<BatchReport>
    where
        P: AsyncRead + Unpin + Send + ?Sized,
    {
        self.frames.prepare()?;

        let frame_capacity = self
            .frames
            .header_frame_len()
            .max(self.frames.length_frame_len())
            .max(self.frames.payload_frame_len(self.buffer_capacity));
        let mut frame = vec![0u8; frame_capacity];
        let mut staging = vec![0u8; self.buffer_capacity];

        let count = self.read_count(peer, &mut frame).await?;
        tracing::info!(count, mode = %self.frames.mode(), "Expected number of records");

        let mut session = self.uplink.open().await?;
        let outcome = self
            .forward_records(peer, &mut session, count, &mut frame, &mut staging)
            .await;

        let records = session.records_forwarded();
        let bytes_forwarded = session.bytes_forwarded();
        let endpoint = session.endpoint().to_string();

        // Single release point for the storage connection.
        let closed = session.close().await;
        match (&outcome, closed) {
            (Err(_), _) => {
                tracing::error!(
                    endpoint = %endpoint,
                    forwarded = records,
                    "Closing storage uplink because of error"
                );
            }
            (Ok(()), Err(e)) => {
                tracing::warn!(endpoint = %endpoint, error = %e, "Storage uplink shutdown failed");
            }
            (Ok(()), Ok(())) => {}
        }
        outcome?;

        tracing::info!(records, bytes_forwarded, "Repair batch applied");
        Ok(BatchReport {
            records,
            bytes_forwarded,
            mode: self.frames.mode(),
        })
    }

    async fn read_count<P>(&self, peer: &mut P, frame: &mut [u8]) -> EntropyResult<u32>
    where
        P: AsyncRead + Unpin + Send + ?Sized,
    {
        let len = self.frames.header_frame_len();
        read_frame(peer, &mut frame[..len], StreamStage::Header).await?;
        let count = self.frames.decode_word(&frame[..len])?;

        if count < 0 {
            return Err(EntropyError::protocol(format!(
                "header declares negative record count {}",
                count
            )));
        }
        if count == 0 {
            return Err(EntropyError::EmptyBatch);
        }
        Ok(count as u32)
    }

    async fn forward_records<P, C>(
        &self,
        peer: &mut P,
        session: &mut UplinkSession<C>,
        count: u32,
        frame: &mut [u8],
        staging: &mut [u8],
    ) -> EntropyResult<()>
    where
        P: AsyncRead + Unpin + Send + ?Sized,
        C: AsyncWrite + Unpin + Send,
    {
        for index in 1..=count {
            if let Err(e) = self
                .forward_record(peer, session, index, frame, staging)
                .await
            {
                tracing::error!(
                    record = index,
                    count,
                    kind = e.kind(),
                    error = %e,
                    "Repair record failed"
                );
                return Err(e);
            }
        }
        Ok(())
    }

    async fn forward_record<P, C>(
        &self,
        peer: &mut P,
        session: &mut UplinkSession<C>,
        index: u32,
        frame: &mut [u8],
        staging: &mut [u8],
    ) -> EntropyResult<()>
    where
        P: AsyncRead + Unpin + Send + ?Sized,
        C: AsyncWrite + Unpin + Send,
    {
        let len = self.frames.length_frame_len();
        read_frame(peer, &mut frame[..len], StreamStage::RecordLength).await?;
        let declared = self.frames.decode_word(&frame[..len])?;
        let length = self.checked_length(declared)?;
        tracing::debug!(record = index, length, "Record length");

        staging.fill(0);

        let len = self.frames.payload_frame_len(length);
        read_frame(peer, &mut frame[..len], StreamStage::RecordPayload).await?;
        let decoded = self.frames.decode_payload(&frame[..len], staging)?;
        if decoded != length {
            return Err(EntropyError::protocol(format!(
                "record declared {} bytes but carried {}",
                length, decoded
            )));
        }

        session.forward(&staging[..length]).await?;
        tracing::trace!(record = index, bytes = length, "Record forwarded to storage");
        Ok(())
    }

    fn checked_length(&self, declared: i32) -> EntropyResult<usize> {
        if declared <= 0 {
            return Err(EntropyError::protocol(format!(
                "record length {} is not positive",
                declared
            )));
        }
        let length = declared as usize;
        if length > self.buffer_capacity {
            return Err(EntropyError::protocol(format!(
                "record length {} exceeds buffer capacity {}",
                length, self.buffer_capacity
            )));
        }
        Ok(length)
    }
}

async fn read_frame<P>(peer: &mut P, buf: &mut [u8], stage: StreamStage) -> EntropyResult<()>
where
    P: AsyncRead + Unpin + Send + ?Sized,
{
    peer.read_exact(buf)
        .await
        .map_err(|e| EntropyError::io(stage, e))?;
    Ok(())
}
