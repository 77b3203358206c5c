//! Repair Batch Receiver Tests
//!
//! Drives `receive_batch` end to end: peer bytes in, storage writes out.
//! Validates ordering, fail-closed length handling, uplink release on every
//! exit path, and parity between the plain and sealed wire formats.

use async_trait::async_trait;
use parking_lot::Mutex;
use proptest::prelude::*;
use replica_entropy::{
    BatchEncoder, CipherCodec, CipherError, CipherKey, EntropyConfig, EntropyError, EntropyReceiver,
    EntropyResult, FrameMode, LoopbackUplink, PlainFrames, SealedFrames, StorageUplink,
    StreamStage,
};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

const CAPACITY: usize = 64;
const CHUNK: usize = CAPACITY + replica_entropy::cipher::SEALED_OVERHEAD;

// ============================================================================
// Recording storage uplink
// ============================================================================

#[derive(Debug, Default)]
struct UplinkLog {
    connects: usize,
    shutdowns: usize,
    drops: usize,
    writes: Vec<Vec<u8>>,
    reject_after: Option<usize>,
}

#[derive(Clone, Default)]
struct RecordingUplink {
    log: Arc<Mutex<UplinkLog>>,
}

impl RecordingUplink {
    fn rejecting_after(writes: usize) -> Self {
        let uplink = Self::default();
        uplink.log.lock().reject_after = Some(writes);
        uplink
    }

    fn writes(&self) -> Vec<Vec<u8>> {
        self.log.lock().writes.clone()
    }

    fn connects(&self) -> usize {
        self.log.lock().connects
    }

    fn assert_released_once(&self) {
        let log = self.log.lock();
        assert_eq!(log.shutdowns, 1, "uplink must be shut down exactly once");
        assert_eq!(log.drops, 1, "uplink must be dropped exactly once");
    }
}

struct RecordingConn {
    log: Arc<Mutex<UplinkLog>>,
}

impl AsyncWrite for RecordingConn {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut log = self.log.lock();
        if log.reject_after.is_some_and(|limit| log.writes.len() >= limit) {
            return Poll::Ready(Ok(0));
        }
        log.writes.push(buf.to_vec());
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.log.lock().shutdowns += 1;
        Poll::Ready(Ok(()))
    }
}

impl Drop for RecordingConn {
    fn drop(&mut self) {
        self.log.lock().drops += 1;
    }
}

#[async_trait]
impl StorageUplink for RecordingUplink {
    type Conn = RecordingConn;

    fn endpoint(&self) -> String {
        "recording".to_string()
    }

    async fn connect(&self) -> EntropyResult<RecordingConn> {
        self.log.lock().connects += 1;
        Ok(RecordingConn {
            log: self.log.clone(),
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn plain_receiver(uplink: RecordingUplink) -> EntropyReceiver<RecordingUplink> {
    EntropyReceiver::new(Arc::new(PlainFrames), uplink, CAPACITY)
}

fn codec(seed: u8) -> Arc<CipherCodec> {
    Arc::new(CipherCodec::new(CipherKey::from_bytes([seed; 32])))
}

fn sealed_receiver(
    codec: Arc<CipherCodec>,
    uplink: RecordingUplink,
) -> EntropyReceiver<RecordingUplink> {
    let frames = SealedFrames::new(codec, CHUNK).unwrap();
    EntropyReceiver::new(Arc::new(frames), uplink, CAPACITY)
}

fn word(value: i32) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

// ============================================================================
// Plain batches
// ============================================================================

#[tokio::test]
async fn two_record_batch_is_forwarded_in_order() {
    let uplink = RecordingUplink::default();
    let receiver = plain_receiver(uplink.clone());

    let mut wire = word(2);
    wire.extend(word(5));
    wire.extend_from_slice(b"hello");
    wire.extend(word(3));
    wire.extend_from_slice(b"bye");

    let report = receiver.receive_batch(&mut wire.as_slice()).await.unwrap();

    assert_eq!(report.records, 2);
    assert_eq!(report.bytes_forwarded, 8);
    assert_eq!(report.mode, FrameMode::Plain);
    assert_eq!(uplink.writes(), vec![b"hello".to_vec(), b"bye".to_vec()]);
    assert_eq!(uplink.connects(), 1);
    uplink.assert_released_once();
}

#[tokio::test]
async fn empty_batch_never_opens_uplink() {
    let uplink = RecordingUplink::default();
    let receiver = plain_receiver(uplink.clone());

    let err = receiver
        .receive_batch(&mut word(0).as_slice())
        .await
        .unwrap_err();

    assert!(matches!(err, EntropyError::EmptyBatch));
    assert_eq!(uplink.connects(), 0);
}

#[tokio::test]
async fn negative_count_is_protocol_error_before_uplink() {
    let uplink = RecordingUplink::default();
    let receiver = plain_receiver(uplink.clone());

    let err = receiver
        .receive_batch(&mut word(-3).as_slice())
        .await
        .unwrap_err();

    assert!(matches!(err, EntropyError::Protocol(_)));
    assert_eq!(uplink.connects(), 0);
}

#[tokio::test]
async fn oversized_record_aborts_without_forwarding_more() {
    let uplink = RecordingUplink::default();
    let receiver = plain_receiver(uplink.clone());

    let mut wire = word(3);
    wire.extend(word(2));
    wire.extend_from_slice(b"ok");
    wire.extend(word(CAPACITY as i32 + 1));
    wire.extend(vec![b'x'; CAPACITY + 1]);
    wire.extend(word(4));
    wire.extend_from_slice(b"late");

    let err = receiver.receive_batch(&mut wire.as_slice()).await.unwrap_err();

    assert!(matches!(err, EntropyError::Protocol(_)));
    assert_eq!(uplink.writes(), vec![b"ok".to_vec()]);
    uplink.assert_released_once();
}

#[tokio::test]
async fn record_at_capacity_is_accepted() {
    let uplink = RecordingUplink::default();
    let receiver = plain_receiver(uplink.clone());
    let record = vec![7u8; CAPACITY];

    let wire = BatchEncoder::plain().encode([&record]).unwrap();
    receiver.receive_batch(&mut wire.as_slice()).await.unwrap();

    assert_eq!(uplink.writes(), vec![record]);
}

#[tokio::test]
async fn zero_length_record_is_protocol_error() {
    let uplink = RecordingUplink::default();
    let receiver = plain_receiver(uplink.clone());

    let mut wire = word(1);
    wire.extend(word(0));

    let err = receiver.receive_batch(&mut wire.as_slice()).await.unwrap_err();

    assert!(matches!(err, EntropyError::Protocol(_)));
    assert!(uplink.writes().is_empty());
    uplink.assert_released_once();
}

#[tokio::test]
async fn peer_eof_mid_payload_keeps_earlier_records() {
    let uplink = RecordingUplink::default();
    let receiver = plain_receiver(uplink.clone());

    let mut wire = word(2);
    wire.extend(word(3));
    wire.extend_from_slice(b"one");
    wire.extend(word(10));
    wire.extend_from_slice(b"shor");

    let err = receiver.receive_batch(&mut wire.as_slice()).await.unwrap_err();

    assert!(matches!(
        err,
        EntropyError::Io {
            stage: StreamStage::RecordPayload,
            ..
        }
    ));
    assert_eq!(uplink.writes(), vec![b"one".to_vec()]);
    uplink.assert_released_once();
}

#[tokio::test]
async fn peer_eof_before_length_is_io_error() {
    let uplink = RecordingUplink::default();
    let receiver = plain_receiver(uplink.clone());

    let err = receiver
        .receive_batch(&mut word(1).as_slice())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EntropyError::Io {
            stage: StreamStage::RecordLength,
            ..
        }
    ));
    uplink.assert_released_once();
}

#[tokio::test]
async fn zero_byte_storage_write_aborts_batch() {
    let uplink = RecordingUplink::rejecting_after(1);
    let receiver = plain_receiver(uplink.clone());

    let wire = BatchEncoder::plain()
        .encode([&b"first"[..], b"second", b"third"])
        .unwrap();
    let err = receiver.receive_batch(&mut wire.as_slice()).await.unwrap_err();

    assert!(matches!(
        err,
        EntropyError::Io {
            stage: StreamStage::UplinkWrite,
            ..
        }
    ));
    assert_eq!(uplink.writes(), vec![b"first".to_vec()]);
    uplink.assert_released_once();
}

#[tokio::test]
async fn streamed_peer_is_read_incrementally() {
    let uplink = RecordingUplink::default();
    let receiver = plain_receiver(uplink.clone());
    let (mut peer_tx, mut peer_rx) = tokio::io::duplex(8);

    let wire = BatchEncoder::plain()
        .encode([&b"SET a 1"[..], b"SET b 2", b"DEL c"])
        .unwrap();
    let sender = tokio::spawn(async move {
        for piece in wire.chunks(3) {
            peer_tx.write_all(piece).await.unwrap();
        }
    });

    let report = receiver.receive_batch(&mut peer_rx).await.unwrap();
    sender.await.unwrap();

    assert_eq!(report.records, 3);
    assert_eq!(
        uplink.writes(),
        vec![b"SET a 1".to_vec(), b"SET b 2".to_vec(), b"DEL c".to_vec()]
    );
}

// ============================================================================
// Sealed batches
// ============================================================================

#[tokio::test]
async fn sealed_batch_matches_plain_batch() {
    let records: Vec<&[u8]> = vec![b"hello", b"bye", &[0u8, 1, 2, 0]];

    let plain_uplink = RecordingUplink::default();
    let plain_wire = BatchEncoder::plain().encode(records.clone()).unwrap();
    plain_receiver(plain_uplink.clone())
        .receive_batch(&mut plain_wire.as_slice())
        .await
        .unwrap();

    let codec = codec(9);
    let sealed_uplink = RecordingUplink::default();
    let sealed_wire = BatchEncoder::sealed(codec.clone(), CHUNK)
        .encode(records)
        .unwrap();
    let report = sealed_receiver(codec.clone(), sealed_uplink.clone())
        .receive_batch(&mut sealed_wire.as_slice())
        .await
        .unwrap();

    assert_eq!(report.mode, FrameMode::Sealed);
    assert!(codec.is_initialized());
    assert_eq!(sealed_uplink.writes(), plain_uplink.writes());
    sealed_uplink.assert_released_once();
}

#[tokio::test]
async fn sealed_batch_with_wrong_key_fails_at_header() {
    let uplink = RecordingUplink::default();
    let wire = BatchEncoder::sealed(codec(1), CHUNK)
        .encode([&b"secret"[..]])
        .unwrap();

    let err = sealed_receiver(codec(2), uplink.clone())
        .receive_batch(&mut wire.as_slice())
        .await
        .unwrap_err();

    assert!(matches!(err, EntropyError::Decrypt(CipherError::Rejected)));
    assert_eq!(uplink.connects(), 0);
}

#[tokio::test]
async fn sealed_payload_shorter_than_declared_is_rejected() {
    let codec = codec(4);
    let uplink = RecordingUplink::default();

    let mut wire = codec.seal(&word(1), CHUNK).unwrap();
    wire.extend(codec.seal(&word(5), CHUNK).unwrap());
    wire.extend(codec.seal(b"hey", CHUNK).unwrap());

    let err = sealed_receiver(codec, uplink.clone())
        .receive_batch(&mut wire.as_slice())
        .await
        .unwrap_err();

    assert!(matches!(err, EntropyError::Protocol(_)));
    assert!(uplink.writes().is_empty());
    uplink.assert_released_once();
}

#[tokio::test]
async fn sealed_length_chunk_without_word_is_decrypt_error() {
    let codec = codec(4);
    let uplink = RecordingUplink::default();

    let mut wire = codec.seal(&word(1), CHUNK).unwrap();
    wire.extend(codec.seal(&[0, 5], CHUNK).unwrap());

    let err = sealed_receiver(codec, uplink.clone())
        .receive_batch(&mut wire.as_slice())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EntropyError::Decrypt(CipherError::ShortOutput { .. })
    ));
    uplink.assert_released_once();
}

#[tokio::test]
async fn default_sealed_config_reads_count_from_one_cipher_chunk() {
    use std::io::Write;

    let mut key_file = tempfile::NamedTempFile::new().unwrap();
    writeln!(key_file, "{}", "5a".repeat(32)).unwrap();
    let config = EntropyConfig {
        encryption: true,
        key_file: Some(key_file.path().to_path_buf()),
        ..EntropyConfig::default()
    };
    let codec = config.load_cipher().unwrap().unwrap();
    let chunk = config.cipher_chunk_size;

    let mut wire = codec.seal(&word(1), chunk).unwrap();
    wire.extend(codec.seal(&word(5), chunk).unwrap());
    wire.extend(codec.seal(b"hello", chunk).unwrap());
    assert_eq!(wire.len(), 3 * chunk);

    let uplink = RecordingUplink::default();
    let report = EntropyReceiver::from_config(&config, Some(codec), uplink.clone())
        .unwrap()
        .receive_batch(&mut wire.as_slice())
        .await
        .unwrap();

    assert_eq!(report.records, 1);
    assert_eq!(uplink.writes(), vec![b"hello".to_vec()]);
    uplink.assert_released_once();
}

// ============================================================================
// Loopback TCP storage
// ============================================================================

#[tokio::test]
async fn batch_reaches_tcp_storage_listener() {
    let storage = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let uplink = LoopbackUplink::with_addr(storage.local_addr().unwrap());
    let receiver = EntropyReceiver::new(Arc::new(PlainFrames), uplink, CAPACITY);

    let applied = tokio::spawn(async move {
        let (mut stream, _) = storage.accept().await.unwrap();
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).await.unwrap();
        bytes
    });

    let wire = BatchEncoder::plain()
        .encode([&b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n"[..], b"*1\r\n$4\r\nPING\r\n"])
        .unwrap();
    let report = receiver.receive_batch(&mut wire.as_slice()).await.unwrap();

    assert_eq!(report.records, 2);
    assert_eq!(
        applied.await.unwrap(),
        b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n*1\r\n$4\r\nPING\r\n"
    );
}

// ============================================================================
// Property Tests
// ============================================================================

fn apply(receiver: &EntropyReceiver<RecordingUplink>, wire: &[u8]) -> EntropyResult<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .map_err(|e| EntropyError::io(StreamStage::Header, e))?;
    let mut peer = wire;
    runtime.block_on(receiver.receive_batch(&mut peer))?;
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn every_record_arrives_verbatim_and_in_order(
        records in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..=CAPACITY), 1..8)
    ) {
        let uplink = RecordingUplink::default();
        let wire = BatchEncoder::plain().encode(&records).unwrap();

        apply(&plain_receiver(uplink.clone()), &wire).unwrap();

        prop_assert_eq!(uplink.writes(), records);
        prop_assert_eq!(uplink.connects(), 1);
    }

    #[test]
    fn sealed_and_plain_paths_agree(
        records in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..=CAPACITY), 1..6)
    ) {
        let codec = codec(11);
        let plain_uplink = RecordingUplink::default();
        let sealed_uplink = RecordingUplink::default();

        let plain_wire = BatchEncoder::plain().encode(&records).unwrap();
        let sealed_wire = BatchEncoder::sealed(codec.clone(), CHUNK)
            .encode(&records)
            .unwrap();

        apply(&plain_receiver(plain_uplink.clone()), &plain_wire).unwrap();
        apply(&sealed_receiver(codec, sealed_uplink.clone()), &sealed_wire).unwrap();

        prop_assert_eq!(sealed_uplink.writes(), plain_uplink.writes());
    }
}
