//! Durable per-commit result artifacts.

use std::path::PathBuf;

use crate::error::{CinderError, Result};

/// Writes one file per completed commit, named by the commit hash, in the
/// scheduler's results directory.
#[derive(Debug)]
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn path_for(&self, commit: &str) -> PathBuf {
        self.dir.join(commit)
    }

    /// Write the artifact unless it already exists. Returns false when the
    /// write was skipped because a duplicate result already landed.
    pub async fn ingest(&self, commit: &str, output: &str) -> Result<bool> {
        validate_commit(commit)?;
        let path = self.path_for(commit);
        if tokio::fs::try_exists(&path).await? {
            return Ok(false);
        }
        tokio::fs::write(&path, output).await?;
        Ok(true)
    }
}

/// Commit hashes become filenames; refuse anything that could escape the
/// results directory.
fn validate_commit(commit: &str) -> Result<()> {
    if commit.is_empty()
        || commit == "."
        || commit == ".."
        || commit.contains('/')
        || commit.contains('\\')
    {
        return Err(CinderError::InvalidCommit(commit.to_string()));
    }
    Ok(())
}
