//! Repository watcher: polls a working copy and submits new commits.
//!
//! The watcher is just another client of the protocol; it holds no cluster
//! state. Each tick pulls the repository, and a moved HEAD becomes a
//! `TEST-<hash>` submission once the scheduler confirms it is alive.

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::WatcherConfig;
use crate::error::{CinderError, Result};
use crate::git::GitRepo;
use crate::protocol::{client, Message};

pub struct Watcher {
    config: WatcherConfig,
    repo: GitRepo,
}

impl Watcher {
    pub fn new(config: WatcherConfig) -> Result<Self> {
        if !config.repo_path.is_dir() {
            return Err(CinderError::RepoMissing(config.repo_path.clone()));
        }
        let repo = GitRepo::with_executable(&config.repo_path, &config.git_executable);
        Ok(Self { config, repo })
    }

    /// Poll until cancelled. Failed polls are logged and retried next tick.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        tracing::info!(
            repo = %self.config.repo_path.display(),
            scheduler = %self.config.scheduler_addr,
            "Watching repository"
        );
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = interval.tick() => {}
            }

            match self.poll().await {
                Ok(Some(commit)) => {
                    tracing::info!(commit = %commit, "Submitted for testing");
                }
                Ok(None) => tracing::debug!("No new commit"),
                Err(e) => tracing::warn!(error = %e, "Poll failed"),
            }
        }
    }

    /// One poll cycle: pull, diff HEAD, submit when it moved. Returns the
    /// submitted commit hash.
    pub async fn poll(&self) -> Result<Option<String>> {
        let before = self.repo.head_hash().await?;
        let pulled = self.repo.pull().await?;
        if !pulled.success() {
            return Err(CinderError::Command("git pull".to_string(), pulled.output));
        }
        let after = self.repo.head_hash().await?;
        if before == after {
            return Ok(None);
        }

        // Confirm the scheduler is up before handing it the commit.
        match client::request(
            &self.config.scheduler_addr,
            &Message::Status,
            self.config.request_timeout,
        )
        .await?
        {
            Message::Okay => {}
            other => {
                return Err(CinderError::UnexpectedReply(
                    self.config.scheduler_addr.clone(),
                    format!("{:?}", other),
                ));
            }
        }

        match client::request(
            &self.config.scheduler_addr,
            &Message::Test(after.clone()),
            self.config.request_timeout,
        )
        .await?
        {
            Message::Okay => tracing::info!(commit = %after, "Tests scheduled"),
            Message::Fail => {
                tracing::warn!(commit = %after, "No idle worker, scheduler parked the commit");
            }
            other => {
                return Err(CinderError::UnexpectedReply(
                    self.config.scheduler_addr.clone(),
                    format!("{:?}", other),
                ));
            }
        }
        Ok(Some(after))
    }
}
