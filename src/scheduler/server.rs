//! Scheduler server: per-connection request dispatch and the assignment
//! algorithm shared with the recovery loop.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::protocol::{self, client, Message};
use crate::scheduler::monitor;
use crate::scheduler::registry::Registry;
use crate::scheduler::results::ResultStore;

/// Central coordinator: accepts protocol requests, tracks workers, and keeps
/// the health and recovery loops running beside the request handler.
pub struct Scheduler {
    config: SchedulerConfig,
    listener: TcpListener,
    registry: Arc<Mutex<Registry>>,
    results: Arc<ResultStore>,
}

impl Scheduler {
    /// Bind the listening socket. Port 0 resolves to an ephemeral port,
    /// readable through [`local_addr`](Self::local_addr).
    pub async fn bind(config: SchedulerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.listen_addr).await?;
        let results = Arc::new(ResultStore::new(config.results_dir.clone()));
        Ok(Self {
            config,
            listener,
            registry: Arc::new(Mutex::new(Registry::new())),
            results,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared handle to the registry, used by the background loops and by
    /// integration tests to observe assignment state.
    pub fn registry(&self) -> Arc<Mutex<Registry>> {
        self.registry.clone()
    }

    /// Serve until the token is cancelled. The health monitor and recovery
    /// loop are spawned once at startup and share the same token.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.local_addr()?;
        tracing::info!(addr = %addr, "Scheduler listening");

        tokio::spawn(monitor::health_loop(
            self.registry.clone(),
            self.config.clone(),
            shutdown.clone(),
        ));
        tokio::spawn(monitor::recovery_loop(
            self.registry.clone(),
            self.config.clone(),
            shutdown.clone(),
        ));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Scheduler shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };
                    let registry = self.registry.clone();
                    let results = self.results.clone();
                    let config = self.config.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, registry, results, config).await {
                            tracing::debug!(peer = %peer, error = %e, "Connection dropped");
                        }
                    });
                }
            }
        }
    }
}

/// One request, one reply, then the connection closes. Malformed input and
/// unexpected headers drop the connection without a reply.
async fn handle_connection(
    mut stream: TcpStream,
    registry: Arc<Mutex<Registry>>,
    results: Arc<ResultStore>,
    config: SchedulerConfig,
) -> Result<()> {
    match protocol::read_message(&mut stream).await? {
        Message::Status => protocol::write_message(&mut stream, &Message::Okay).await,
        Message::Register(addr) => {
            if registry.lock().await.register_worker(&addr) {
                tracing::info!(worker = %addr, "Worker registered");
            } else {
                tracing::debug!(worker = %addr, "Worker re-registered");
            }
            protocol::write_message(&mut stream, &Message::Okay).await
        }
        Message::Test(commit) => {
            let reply = if assign_commit(&registry, &config, &commit).await {
                Message::Okay
            } else {
                Message::Fail
            };
            protocol::write_message(&mut stream, &reply).await
        }
        Message::Result { commit, output } => {
            ingest_result(&registry, &results, &commit, &output).await?;
            protocol::write_message(&mut stream, &Message::Okay).await
        }
        other => {
            tracing::warn!(message = ?other, "Unexpected request");
            Ok(())
        }
    }
}

/// Assignment algorithm shared by test submission and the recovery loop:
/// scan workers in registration order and hand the commit to the first one
/// answering the idle probe. The registry lock is never held across a
/// network exchange; only the snapshots and the final bookkeeping take it.
pub(crate) async fn assign_commit(
    registry: &Arc<Mutex<Registry>>,
    config: &SchedulerConfig,
    commit: &str,
) -> bool {
    let workers = {
        let reg = registry.lock().await;
        if reg.is_assigned(commit) {
            // Another submission already placed this commit.
            return true;
        }
        reg.workers()
    };

    for worker in workers {
        match client::request(&worker, &Message::Hello, config.request_timeout).await {
            Ok(Message::Hello) => {}
            // Busy or unreachable; try the next one.
            _ => continue,
        }
        match client::request(
            &worker,
            &Message::Test(commit.to_string()),
            config.request_timeout,
        )
        .await
        {
            Ok(Message::Okay) => {
                let mut reg = registry.lock().await;
                reg.mark_assigned(commit, &worker);
                tracing::info!(commit = %commit, worker = %worker, "Commit assigned");
                return true;
            }
            // The worker went busy between the idle probe and the claim;
            // keep scanning.
            _ => continue,
        }
    }

    let mut reg = registry.lock().await;
    if reg.is_assigned(commit) {
        // A concurrent caller won the race while we were scanning.
        return true;
    }
    if reg.mark_pending(commit) {
        tracing::info!(commit = %commit, "No idle worker, commit parked for recovery");
    }
    false
}

async fn ingest_result(
    registry: &Arc<Mutex<Registry>>,
    results: &ResultStore,
    commit: &str,
    output: &str,
) -> Result<()> {
    let owner = registry.lock().await.complete(commit);
    let written = results.ingest(commit, output).await?;
    if written {
        tracing::info!(commit = %commit, worker = ?owner, "Result ingested");
    } else {
        tracing::debug!(commit = %commit, "Duplicate result ignored");
    }
    Ok(())
}
