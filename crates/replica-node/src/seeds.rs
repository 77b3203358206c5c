//! Seed refresh loop
//!
//! Ticks once a second and lets the poller's own interval decide when DNS
//! is actually queried.

use replica_seeds::{DnsExchange, PollOutcome, SeedPoller};
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::info;

/// Loop cadence; the poller rate-limits the real queries
pub const POLL_TICK: Duration = Duration::from_secs(1);

/// Poll until `shutdown` resolves, handing each new seed set to `on_update`
///
/// Returns the number of updates delivered.
pub async fn run_poll_loop<X, S, F>(
    poller: &mut SeedPoller<X>,
    tick: Duration,
    shutdown: S,
    mut on_update: F,
) -> u64
where
    X: DnsExchange,
    S: Future<Output = ()>,
    F: FnMut(&[u8]),
{
    info!(
        txt_name = poller.txt_name(),
        interval_ms = poller.min_interval().as_millis() as u64,
        "Seed poller started"
    );

    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut seeds = Vec::new();
    let mut updates = 0u64;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!(updates, "Seed poller stopping");
                return updates;
            }
            _ = ticker.tick() => {
                if let PollOutcome::Updated = poller.poll(&mut seeds).await {
                    updates += 1;
                    on_update(&seeds);
                }
            }
        }
    }
}

/// Log a seed set at info level
pub fn log_seeds(seeds: &[u8]) {
    info!(seeds = %String::from_utf8_lossy(seeds), "Seeds updated");
}
