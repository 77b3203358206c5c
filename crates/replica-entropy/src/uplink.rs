//! Storage uplink connector
//!
//! Opens the connection used to apply repaired records to the local
//! storage engine. One connection per batch, single attempt, no retry.

use crate::error::{EntropyError, EntropyResult, StreamStage};
use async_trait::async_trait;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// Well-known storage engine listener port
pub const DEFAULT_UPLINK_PORT: u16 = 22122;

/// Connector to the storage engine's native protocol listener
#[async_trait]
pub trait StorageUplink: Send + Sync {
    /// Byte stream written with records in storage-native serialization
    type Conn: AsyncWrite + Unpin + Send;

    /// Human-readable endpoint for logs and errors
    fn endpoint(&self) -> String;

    /// Open a fresh connection
    async fn connect(&self) -> EntropyResult<Self::Conn>;

    /// Open a fresh connection wrapped in a scoped session
    async fn open(&self) -> EntropyResult<UplinkSession<Self::Conn>> {
        let conn = self.connect().await?;
        Ok(UplinkSession::new(conn, self.endpoint()))
    }
}

/// TCP connector for a storage engine on the loopback interface
#[derive(Debug, Clone)]
pub struct LoopbackUplink {
    addr: SocketAddr,
}

impl LoopbackUplink {
    /// Connector for `127.0.0.1:port`
    pub fn new(port: u16) -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
        }
    }

    /// Connector for an explicit address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Target address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Default for LoopbackUplink {
    fn default() -> Self {
        Self::new(DEFAULT_UPLINK_PORT)
    }
}

#[async_trait]
impl StorageUplink for LoopbackUplink {
    type Conn = TcpStream;

    fn endpoint(&self) -> String {
        self.addr.to_string()
    }

    async fn connect(&self) -> EntropyResult<TcpStream> {
        tracing::debug!(endpoint = %self.addr, "Connecting to storage uplink");

        let unavailable = |e: io::Error| EntropyError::UplinkUnavailable {
            endpoint: self.addr.to_string(),
            reason: e.to_string(),
        };

        let stream = TcpStream::connect(self.addr).await.map_err(unavailable)?;
        stream.set_nodelay(true).map_err(unavailable)?;

        tracing::info!(endpoint = %self.addr, "Storage uplink connection established");
        Ok(stream)
    }
}

/// Storage connection scoped to one batch
///
/// [`close`](Self::close) shuts the stream down; a session dropped without
/// it still releases the socket.
pub struct UplinkSession<C> {
    conn: Option<C>,
    endpoint: String,
    records: u32,
    bytes: u64,
}

impl<C: AsyncWrite + Unpin> UplinkSession<C> {
    /// Wrap an open connection
    pub fn new(conn: C, endpoint: impl Into<String>) -> Self {
        Self {
            conn: Some(conn),
            endpoint: endpoint.into(),
            records: 0,
            bytes: 0,
        }
    }

    /// Write one record verbatim and flush it
    pub async fn forward(&mut self, record: &[u8]) -> EntropyResult<()> {
        let conn = self.conn.as_mut().ok_or_else(|| {
            EntropyError::io(
                StreamStage::UplinkWrite,
                io::Error::new(io::ErrorKind::NotConnected, "storage uplink already closed"),
            )
        })?;

        conn.write_all(record)
            .await
            .map_err(|e| EntropyError::io(StreamStage::UplinkWrite, e))?;
        conn.flush()
            .await
            .map_err(|e| EntropyError::io(StreamStage::UplinkWrite, e))?;

        self.records += 1;
        self.bytes += record.len() as u64;
        Ok(())
    }

    /// Shut the connection down
    pub async fn close(mut self) -> io::Result<()> {
        match self.conn.take() {
            Some(mut conn) => conn.shutdown().await,
            None => Ok(()),
        }
    }

    /// Records forwarded so far
    pub fn records_forwarded(&self) -> u32 {
        self.records
    }

    /// Payload bytes forwarded so far
    pub fn bytes_forwarded(&self) -> u64 {
        self.bytes
    }

    /// Endpoint this session writes to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl<C> Drop for UplinkSession<C> {
    fn drop(&mut self) {
        if self.conn.is_some() {
            tracing::warn!(endpoint = %self.endpoint, "Storage uplink released without shutdown");
        }
    }
}
