//! Background convergence loops.
//!
//! The health monitor and recovery loop run beside the request handler and
//! pull the registry toward "every known commit is completed, assigned to a
//! live worker, or pending." Both snapshot under the lock and probe without
//! it, so a slow or unreachable worker never stalls request handling.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::SchedulerConfig;
use crate::protocol::{client, Message};
use crate::scheduler::registry::Registry;
use crate::scheduler::server;

/// Probe every registered worker each interval; evict the unresponsive and
/// requeue whatever they were testing.
pub async fn health_loop(
    registry: Arc<Mutex<Registry>>,
    config: SchedulerConfig,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(config.probe_interval);
    // A slow sweep must not stack onto the next tick.
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = interval.tick() => {}
        }

        let workers = registry.lock().await.workers();
        for worker in workers {
            let healthy = matches!(
                client::request(&worker, &Message::Status, config.request_timeout).await,
                Ok(Message::Okay)
            );
            if healthy {
                continue;
            }

            match registry.lock().await.evict_worker(&worker) {
                Some(Some(commit)) => {
                    tracing::warn!(worker = %worker, commit = %commit, "Worker evicted, commit requeued");
                }
                Some(None) => {
                    tracing::warn!(worker = %worker, "Worker evicted");
                }
                // Already gone; nothing to do.
                None => {}
            }
        }
    }
}

/// Retry assignment for every pending commit each interval. The pending set
/// is snapshotted per tick; commits that fail to place simply wait for the
/// next sweep.
pub async fn recovery_loop(
    registry: Arc<Mutex<Registry>>,
    config: SchedulerConfig,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(config.retry_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = interval.tick() => {}
        }

        let pending = registry.lock().await.pending();
        if pending.is_empty() {
            continue;
        }
        tracing::debug!(pending = pending.len(), "Recovery sweep");

        for commit in pending {
            if server::assign_commit(&registry, &config, &commit).await {
                tracing::info!(commit = %commit, "Pending commit recovered");
            }
        }
    }
}
