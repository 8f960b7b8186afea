//! Repository watcher tests against stub version control and a scripted
//! scheduler endpoint.


use std::time::Duration;

use cinder::config::WatcherConfig;
use cinder::error::CinderError;
use cinder::watcher::Watcher;
use test_harness::{write_stub_git, FakeScheduler};

/// Stub where `rev-parse` reads the fake HEAD and `pull` advances it once.
const STUB_GIT_ADVANCING: &str = "#!/bin/sh\ncase \"$1\" in\n  rev-parse) cat head.txt ;;\n  pull) echo bbb222 > head.txt ;;\nesac\nexit 0\n";

fn test_watcher(scheduler_addr: &str, repo: &std::path::Path, stub_body: &str) -> Watcher {
    let stub = write_stub_git(repo, stub_body);
    let config = WatcherConfig {
        scheduler_addr: scheduler_addr.to_string(),
        repo_path: repo.to_path_buf(),
        git_executable: stub.to_str().unwrap().to_string(),
        poll_interval: Duration::from_millis(100),
        request_timeout: Duration::from_millis(500),
    };
    Watcher::new(config).unwrap()
}

#[tokio::test]
async fn test_watcher_submits_a_moved_head() {
    let scheduler = FakeScheduler::start().await;
    let repo = tempfile::tempdir().unwrap();
    std::fs::write(repo.path().join("head.txt"), "aaa111\n").unwrap();

    let watcher = test_watcher(&scheduler.addr, repo.path(), STUB_GIT_ADVANCING);

    let submitted = watcher.poll().await.unwrap();
    assert_eq!(submitted.as_deref(), Some("bbb222"));
    assert_eq!(scheduler.submissions(), vec!["bbb222".to_string()]);
}

#[tokio::test]
async fn test_watcher_skips_an_unmoved_head() {
    let scheduler = FakeScheduler::start().await;
    let repo = tempfile::tempdir().unwrap();
    // The pull leaves HEAD where it already is.
    std::fs::write(repo.path().join("head.txt"), "bbb222\n").unwrap();

    let watcher = test_watcher(&scheduler.addr, repo.path(), STUB_GIT_ADVANCING);

    assert_eq!(watcher.poll().await.unwrap(), None);
    assert!(scheduler.submissions().is_empty());
}

#[tokio::test]
async fn test_watcher_surfaces_pull_failures() {
    let scheduler = FakeScheduler::start().await;
    let repo = tempfile::tempdir().unwrap();
    std::fs::write(repo.path().join("head.txt"), "aaa111\n").unwrap();
    let stub = "#!/bin/sh\ncase \"$1\" in\n  rev-parse) cat head.txt; exit 0 ;;\n  pull) echo 'could not resolve host' >&2; exit 1 ;;\nesac\n";

    let watcher = test_watcher(&scheduler.addr, repo.path(), stub);

    assert!(matches!(
        watcher.poll().await,
        Err(CinderError::Command(_, _))
    ));
    assert!(scheduler.submissions().is_empty());
}

#[tokio::test]
async fn test_watcher_requires_a_live_scheduler() {
    let repo = tempfile::tempdir().unwrap();
    std::fs::write(repo.path().join("head.txt"), "aaa111\n").unwrap();

    // Nothing listens on this port.
    let watcher = test_watcher("127.0.0.1:1", repo.path(), STUB_GIT_ADVANCING);

    assert!(watcher.poll().await.is_err());
}

#[tokio::test]
async fn test_missing_repository_is_fatal_at_startup() {
    let config = WatcherConfig {
        repo_path: std::path::PathBuf::from("/definitely/not/a/repo"),
        ..WatcherConfig::default()
    };

    assert!(matches!(
        Watcher::new(config),
        Err(CinderError::RepoMissing(_))
    ));
}
