//! External command plumbing for the version-control and test-runner steps.
//!
//! Commands run as child processes with combined stdout/stderr capture.
//! Spawn failures (missing executable, bad working directory) are errors;
//! a non-zero exit is an ordinary [`CommandOutput`] the caller inspects.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::error::{CinderError, Result};

/// Captured outcome of one external command.
#[derive(Debug)]
pub struct CommandOutput {
    /// Exit code, or `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Captured stdout followed by captured stderr.
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs version-control subcommands inside one working copy.
#[derive(Debug, Clone)]
pub struct GitRepo {
    path: PathBuf,
    executable: String,
}

impl GitRepo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_executable(path, "git")
    }

    /// Use an alternative executable. Tests point this at a stub script.
    pub fn with_executable(path: impl Into<PathBuf>, executable: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            executable: executable.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hash of the working copy's current HEAD.
    pub async fn head_hash(&self) -> Result<String> {
        let out = self.git(&["rev-parse", "HEAD"]).await?;
        if !out.success() {
            return Err(CinderError::Command(
                format!("{} rev-parse HEAD", self.executable),
                out.output,
            ));
        }
        Ok(out.output.trim().to_string())
    }

    /// Remove untracked and ignored files from the working tree.
    pub async fn clean(&self) -> Result<CommandOutput> {
        self.git(&["clean", "-d", "-f", "-x"]).await
    }

    /// Fetch and merge the latest upstream changes.
    pub async fn pull(&self) -> Result<CommandOutput> {
        self.git(&["pull"]).await
    }

    /// Hard-reset the working tree to the given commit.
    pub async fn reset_hard(&self, commit: &str) -> Result<CommandOutput> {
        self.git(&["reset", "--hard", commit]).await
    }

    async fn git(&self, args: &[&str]) -> Result<CommandOutput> {
        run_command(&self.path, &self.executable, args).await
    }
}

/// Run an external command with captured, combined output.
pub async fn run_command(dir: &Path, program: &str, args: &[&str]) -> Result<CommandOutput> {
    let spawned = Command::new(program)
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await;

    match spawned {
        Ok(out) => {
            let mut text = String::from_utf8_lossy(&out.stdout).to_string();
            text.push_str(&String::from_utf8_lossy(&out.stderr));
            Ok(CommandOutput {
                exit_code: out.status.code(),
                output: text,
            })
        }
        Err(e) => Err(CinderError::Command(
            format!("{} {}", program, args.join(" ")),
            e.to_string(),
        )),
    }
}

/// Run a shell command line (`sh -c`) with captured, combined output.
pub async fn run_shell(dir: &Path, command_line: &str) -> Result<CommandOutput> {
    run_command(dir, "sh", &["-c", command_line]).await
}
