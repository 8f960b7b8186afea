//! The four-step test pipeline: clean, pull, reset, test.
//!
//! Failures are values, not process exits: a broken preparation step or a
//! failing test run becomes a report sent back to the scheduler, and the
//! agent stays alive and idle afterwards.

use crate::error::Result;
use crate::git::{self, CommandOutput, GitRepo};

/// Outcome of one pipeline run, reported back to the scheduler verbatim.
#[derive(Debug)]
pub struct PipelineReport {
    pub commit: String,
    pub passed: bool,
    /// Captured combined output of the test run, or a description of the
    /// step that broke.
    pub output: String,
}

#[derive(Debug, Clone)]
pub struct TestPipeline {
    repo: GitRepo,
    test_command: String,
}

impl TestPipeline {
    pub fn new(repo: GitRepo, test_command: impl Into<String>) -> Self {
        Self {
            repo,
            test_command: test_command.into(),
        }
    }

    /// Run every step, stopping at the first failure.
    pub async fn run(&self, commit: &str) -> PipelineReport {
        tracing::info!(commit = %commit, "Starting test pipeline");

        if let Err(report) = check_step(commit, "git clean", self.repo.clean().await) {
            return report;
        }
        if let Err(report) = check_step(commit, "git pull", self.repo.pull().await) {
            return report;
        }
        if let Err(report) = check_step(commit, "git reset", self.repo.reset_hard(commit).await) {
            return report;
        }

        match git::run_shell(self.repo.path(), &self.test_command).await {
            Ok(out) => {
                let passed = out.success();
                tracing::info!(
                    commit = %commit,
                    passed,
                    exit_code = ?out.exit_code,
                    "Test pipeline finished"
                );
                PipelineReport {
                    commit: commit.to_string(),
                    passed,
                    output: out.output,
                }
            }
            Err(e) => failure_report(commit, &self.test_command, &e.to_string()),
        }
    }
}

/// Gate one preparation step; a non-zero exit or spawn failure becomes the
/// final report.
fn check_step(
    commit: &str,
    stage: &str,
    result: Result<CommandOutput>,
) -> std::result::Result<(), PipelineReport> {
    match result {
        Ok(out) if out.success() => Ok(()),
        Ok(out) => {
            let code = out
                .exit_code
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            Err(failure_report(
                commit,
                stage,
                &format!("exit code {}\n{}", code, out.output),
            ))
        }
        Err(e) => Err(failure_report(commit, stage, &e.to_string())),
    }
}

fn failure_report(commit: &str, stage: &str, detail: &str) -> PipelineReport {
    tracing::warn!(commit = %commit, stage, "Pipeline step failed");
    PipelineReport {
        commit: commit.to_string(),
        passed: false,
        output: format!("{} failed: {}", stage, detail),
    }
}
