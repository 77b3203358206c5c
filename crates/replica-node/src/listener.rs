//! Entropy listener
//!
//! Accepts peer connections and runs one repair batch per connection on
//! its own task.

use replica_entropy::{EntropyReceiver, StorageUplink};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Accept peers until `shutdown` resolves
///
/// Batches already in flight keep running on their tasks; only the accept
/// loop stops. Returns the number of connections accepted.
pub async fn serve<U, S>(
    listener: TcpListener,
    receiver: Arc<EntropyReceiver<U>>,
    shutdown: S,
) -> anyhow::Result<u64>
where
    U: StorageUplink + 'static,
    S: Future<Output = ()>,
{
    let local = listener.local_addr()?;
    info!(%local, mode = %receiver.mode(), "Entropy listener started");

    tokio::pin!(shutdown);
    let mut accepted = 0u64;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!(%local, accepted, "Entropy listener stopping");
                return Ok(accepted);
            }
            conn = listener.accept() => {
                let (mut stream, peer) = match conn {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(%local, error = %e, "Failed to accept peer connection");
                        continue;
                    }
                };
                accepted += 1;
                debug!(%peer, "Peer connected");

                let receiver = Arc::clone(&receiver);
                tokio::spawn(async move {
                    match receiver.receive_batch(&mut stream).await {
                        Ok(report) => info!(
                            %peer,
                            records = report.records,
                            bytes = report.bytes_forwarded,
                            "Repair batch applied"
                        ),
                        // receive_batch has already logged the failure details
                        Err(e) => error!(%peer, kind = e.kind(), "Repair batch aborted"),
                    }
                });
            }
        }
    }
}
