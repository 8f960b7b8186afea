//! Worker agent: registers with the scheduler, executes at most one test
//! pipeline at a time, and reports captured output back.
//!
//! # Lifecycle
//!
//! 1. Bind the listener (port 0 resolves to an OS-assigned ephemeral port,
//!    used for both listening and registration)
//! 2. Register the advertised address with the scheduler; rejection is fatal
//! 3. Probe the scheduler's liveness on an interval; a scheduler that stops
//!    answering takes the agent down with it
//! 4. Serve one message per inbound connection: `STATUS`, `HELLO`, `TEST`
//!
//! The test slot is the agent's whole state machine: a claimed slot makes
//! `HELLO` read busy and `TEST` reply `FAIL` until the pipeline releases it.

pub mod pipeline;
pub mod slot;

pub use pipeline::{PipelineReport, TestPipeline};
pub use slot::TestSlot;

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::error::{CinderError, Result};
use crate::git::GitRepo;
use crate::protocol::{self, client, Message};

/// A tester process serving the scheduler's probes and test requests.
pub struct Worker {
    config: WorkerConfig,
    listener: TcpListener,
    advertise_addr: String,
    slot: Arc<TestSlot>,
    pipeline: Arc<TestPipeline>,
}

impl Worker {
    /// Bind the listener and resolve the advertised address. Registration
    /// happens in [`run`](Self::run).
    pub async fn bind(config: WorkerConfig) -> Result<Self> {
        if !config.repo_path.is_dir() {
            return Err(CinderError::RepoMissing(config.repo_path.clone()));
        }
        let listener = TcpListener::bind(config.listen_addr).await?;
        let port = listener.local_addr()?.port();
        let advertise_addr = format!("{}:{}", config.advertise_host, port);

        let repo = GitRepo::with_executable(&config.repo_path, &config.git_executable);
        let pipeline = Arc::new(TestPipeline::new(repo, &config.test_command));

        Ok(Self {
            config,
            listener,
            advertise_addr,
            slot: Arc::new(TestSlot::new()),
            pipeline,
        })
    }

    /// Address peers use to reach this agent, with the bound port filled in.
    pub fn advertise_addr(&self) -> &str {
        &self.advertise_addr
    }

    /// Register, then serve until the scheduler disappears or the token is
    /// cancelled. A rejected registration aborts startup.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let registration = Message::Register(self.advertise_addr.clone());
        match client::request(
            &self.config.scheduler_addr,
            &registration,
            self.config.request_timeout,
        )
        .await
        {
            Ok(Message::Okay) => {
                tracing::info!(
                    addr = %self.advertise_addr,
                    scheduler = %self.config.scheduler_addr,
                    "Worker registered"
                );
            }
            _ => {
                return Err(CinderError::RegistrationRejected(
                    self.config.scheduler_addr.clone(),
                ));
            }
        }

        tokio::spawn(scheduler_watch(self.config.clone(), shutdown.clone()));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(addr = %self.advertise_addr, "Worker shutting down");
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
                    let slot = self.slot.clone();
                    let pipeline = self.pipeline.clone();
                    let config = self.config.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, slot, pipeline, config).await {
                            tracing::debug!(peer = %peer, error = %e, "Connection dropped");
                        }
                    });
                }
            }
        }
    }
}

/// Probe the scheduler on the configured interval; cancel the whole agent
/// when it stops answering.
async fn scheduler_watch(config: WorkerConfig, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(config.probe_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = interval.tick() => {}
        }

        let alive = matches!(
            client::request(&config.scheduler_addr, &Message::Status, config.request_timeout)
                .await,
            Ok(Message::Okay)
        );
        if !alive {
            tracing::error!(
                scheduler = %config.scheduler_addr,
                "Scheduler is no longer answering, stopping worker"
            );
            shutdown.cancel();
            return;
        }
    }
}

/// One request, one reply. `HELLO` reads the slot without blocking; `TEST`
/// claims it with a compare-and-swap and replies before the pipeline runs.
async fn handle_connection(
    mut stream: TcpStream,
    slot: Arc<TestSlot>,
    pipeline: Arc<TestPipeline>,
    config: WorkerConfig,
) -> Result<()> {
    match protocol::read_message(&mut stream).await? {
        Message::Status => protocol::write_message(&mut stream, &Message::Okay).await,
        Message::Hello => {
            // Only an idle slot advertises itself; anything else reads as
            // busy on the scheduler side.
            let reply = if slot.is_idle() {
                Message::Hello
            } else {
                Message::Fail
            };
            protocol::write_message(&mut stream, &reply).await
        }
        Message::Test(commit) => {
            if !slot.try_claim() {
                return protocol::write_message(&mut stream, &Message::Fail).await;
            }
            tracing::info!(commit = %commit, "Test slot claimed");

            // Acknowledge before the pipeline runs; the scheduler only
            // waits for the claim, not the result.
            if let Err(e) = protocol::write_message(&mut stream, &Message::Okay).await {
                slot.release();
                return Err(e);
            }
            tokio::spawn(run_and_report(commit, slot, pipeline, config));
            Ok(())
        }
        other => {
            tracing::warn!(message = ?other, "Unexpected request");
            Ok(())
        }
    }
}

/// Drive the pipeline, report the outcome, release the slot. The report is
/// best-effort: a scheduler that cannot be reached costs the result, not
/// the agent.
async fn run_and_report(
    commit: String,
    slot: Arc<TestSlot>,
    pipeline: Arc<TestPipeline>,
    config: WorkerConfig,
) {
    let report = pipeline.run(&commit).await;
    let message = Message::Result {
        commit: report.commit.clone(),
        output: report.output,
    };
    match client::request(&config.scheduler_addr, &message, config.request_timeout).await {
        Ok(_) => {
            tracing::info!(commit = %report.commit, passed = report.passed, "Result reported");
        }
        Err(e) => {
            tracing::warn!(commit = %report.commit, error = %e, "Failed to report result");
        }
    }
    slot.release();
}
