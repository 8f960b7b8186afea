//! Shared scheduler state: worker list, assignment map, pending queue.
//!
//! The three structures move together under one lock (`Arc<Mutex<Registry>>`
//! held by the server); the methods here are the only mutation points, so a
//! commit is always in exactly one of the pending queue or the assignment
//! map, never both.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// A commit waiting for an idle worker.
#[derive(Debug, Clone)]
pub struct PendingCommit {
    pub hash: String,
    pub queued_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct Registry {
    /// Worker addresses in registration order.
    workers: Vec<String>,
    /// commit hash -> address of the worker testing it.
    assignments: HashMap<String, String>,
    /// Commits awaiting assignment, oldest first, no duplicates.
    pending: Vec<PendingCommit>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a worker if it is not already known. Returns false on a
    /// re-registration, which is accepted but changes nothing.
    pub fn register_worker(&mut self, addr: &str) -> bool {
        if self.workers.iter().any(|w| w == addr) {
            return false;
        }
        self.workers.push(addr.to_string());
        true
    }

    /// Snapshot of the worker list in registration order.
    pub fn workers(&self) -> Vec<String> {
        self.workers.clone()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn is_assigned(&self, commit: &str) -> bool {
        self.assignments.contains_key(commit)
    }

    pub fn assignment(&self, commit: &str) -> Option<&str> {
        self.assignments.get(commit).map(String::as_str)
    }

    /// Record a successful assignment. The commit leaves the pending queue
    /// in the same call.
    pub fn mark_assigned(&mut self, commit: &str, worker: &str) {
        self.pending.retain(|p| p.hash != commit);
        self.assignments
            .insert(commit.to_string(), worker.to_string());
    }

    /// Park a commit for the recovery loop. No-op when it is already pending
    /// or currently assigned.
    pub fn mark_pending(&mut self, commit: &str) -> bool {
        if self.is_assigned(commit) || self.pending.iter().any(|p| p.hash == commit) {
            return false;
        }
        self.pending.push(PendingCommit {
            hash: commit.to_string(),
            queued_at: Utc::now(),
        });
        true
    }

    /// Drop the assignment entry once a result is ingested. Returns the
    /// owning worker, or `None` when the commit was not assigned (duplicate
    /// results land here).
    pub fn complete(&mut self, commit: &str) -> Option<String> {
        self.assignments.remove(commit)
    }

    /// Remove a worker and requeue its in-flight commit, if any.
    ///
    /// Returns `None` when the worker was not registered. The inner option
    /// is the requeued commit; an idle worker owns nothing, which is not an
    /// error.
    pub fn evict_worker(&mut self, addr: &str) -> Option<Option<String>> {
        let index = self.workers.iter().position(|w| w == addr)?;
        self.workers.remove(index);

        let commit = self
            .assignments
            .iter()
            .find(|(_, worker)| worker.as_str() == addr)
            .map(|(commit, _)| commit.clone());
        if let Some(ref commit) = commit {
            self.assignments.remove(commit);
            self.mark_pending(commit);
        }
        Some(commit)
    }

    /// Pending commit hashes, oldest first.
    pub fn pending(&self) -> Vec<String> {
        self.pending.iter().map(|p| p.hash.clone()).collect()
    }

    /// Pending entries with their queueing timestamps.
    pub fn pending_entries(&self) -> Vec<PendingCommit> {
        self.pending.clone()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn assignment_count(&self) -> usize {
        self.assignments.len()
    }
}
