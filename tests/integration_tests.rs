//! End-to-end scheduler tests over real localhost TCP.


use std::time::Duration;

use tokio::io::AsyncWriteExt;

use cinder::protocol::{self, Message};
use test_harness::{assert_eventually, test_scheduler_config, FakeWorker, TestScheduler};

#[tokio::test]
async fn test_status_probe_answers_okay() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = TestScheduler::start(test_scheduler_config(dir.path())).await;

    assert_eq!(scheduler.request(&Message::Status).await, Message::Okay);
}

#[tokio::test]
async fn test_register_then_submit_assigns_commit() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = TestScheduler::start(test_scheduler_config(dir.path())).await;
    let worker = FakeWorker::start().await;

    let reply = scheduler
        .request(&Message::Register(worker.addr.clone()))
        .await;
    assert_eq!(reply, Message::Okay);

    let reply = scheduler
        .request(&Message::Test("abc123".to_string()))
        .await;
    assert_eq!(reply, Message::Okay);

    assert_eq!(worker.received_commits(), vec!["abc123".to_string()]);

    let registry = scheduler.registry.lock().await;
    assert_eq!(registry.assignment("abc123"), Some(worker.addr.as_str()));
    assert_eq!(registry.pending_len(), 0);
}

#[tokio::test]
async fn test_submit_without_workers_fails_and_parks() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = TestScheduler::start(test_scheduler_config(dir.path())).await;

    let reply = scheduler
        .request(&Message::Test("def456".to_string()))
        .await;
    assert_eq!(reply, Message::Fail);

    let registry = scheduler.registry.lock().await;
    assert_eq!(registry.pending(), vec!["def456".to_string()]);
    assert_eq!(registry.assignment_count(), 0);
}

#[tokio::test]
async fn test_duplicate_registration_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = TestScheduler::start(test_scheduler_config(dir.path())).await;
    let worker = FakeWorker::start().await;

    for _ in 0..2 {
        let reply = scheduler
            .request(&Message::Register(worker.addr.clone()))
            .await;
        assert_eq!(reply, Message::Okay);
    }

    assert_eq!(scheduler.registry.lock().await.worker_count(), 1);
}

#[tokio::test]
async fn test_busy_worker_parks_submission() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = TestScheduler::start(test_scheduler_config(dir.path())).await;
    let worker = FakeWorker::start().await;
    worker.set_busy(true);

    scheduler
        .request(&Message::Register(worker.addr.clone()))
        .await;
    let reply = scheduler
        .request(&Message::Test("abc123".to_string()))
        .await;
    assert_eq!(reply, Message::Fail);

    let registry = scheduler.registry.lock().await;
    assert_eq!(registry.pending(), vec!["abc123".to_string()]);
    assert!(worker.received_commits().is_empty());
}

#[tokio::test]
async fn test_recovery_assigns_parked_commit() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = TestScheduler::start(test_scheduler_config(dir.path())).await;
    let worker = FakeWorker::start().await;
    worker.set_busy(true);

    scheduler
        .request(&Message::Register(worker.addr.clone()))
        .await;
    let reply = scheduler
        .request(&Message::Test("abc123".to_string()))
        .await;
    assert_eq!(reply, Message::Fail);

    worker.set_busy(false);

    assert_eventually(
        || async {
            worker
                .received_commits()
                .contains(&"abc123".to_string())
        },
        Duration::from_secs(5),
        "recovery loop did not assign the parked commit",
    )
    .await;

    assert_eventually(
        || async {
            let registry = scheduler.registry.lock().await;
            registry.is_assigned("abc123") && registry.pending_len() == 0
        },
        Duration::from_secs(5),
        "parked commit did not move into the assignment map",
    )
    .await;
}

#[tokio::test]
async fn test_dead_worker_evicted_and_commit_requeued() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = TestScheduler::start(test_scheduler_config(dir.path())).await;
    let worker = FakeWorker::start().await;

    scheduler
        .request(&Message::Register(worker.addr.clone()))
        .await;
    let reply = scheduler
        .request(&Message::Test("abc123".to_string()))
        .await;
    assert_eq!(reply, Message::Okay);

    // The worker vanishes mid-test; probes now see a refused connection.
    worker.stop();

    assert_eventually(
        || async {
            let registry = scheduler.registry.lock().await;
            registry.worker_count() == 0 && registry.pending().contains(&"abc123".to_string())
        },
        Duration::from_secs(5),
        "health monitor did not evict the dead worker and requeue its commit",
    )
    .await;
}

#[tokio::test]
async fn test_result_ingestion_writes_artifact_and_clears_assignment() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = TestScheduler::start(test_scheduler_config(dir.path())).await;
    let worker = FakeWorker::start().await;

    scheduler
        .request(&Message::Register(worker.addr.clone()))
        .await;
    scheduler
        .request(&Message::Test("abc123".to_string()))
        .await;

    let reply = scheduler
        .request(&Message::Result {
            commit: "abc123".to_string(),
            output: "PASS".to_string(),
        })
        .await;
    assert_eq!(reply, Message::Okay);

    let artifact = std::fs::read_to_string(dir.path().join("abc123")).unwrap();
    assert_eq!(artifact, "PASS");
    assert_eq!(scheduler.registry.lock().await.assignment_count(), 0);
}

#[tokio::test]
async fn test_duplicate_result_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = TestScheduler::start(test_scheduler_config(dir.path())).await;

    for output in ["first", "second"] {
        let reply = scheduler
            .request(&Message::Result {
                commit: "abc123".to_string(),
                output: output.to_string(),
            })
            .await;
        assert_eq!(reply, Message::Okay);
    }

    let artifact = std::fs::read_to_string(dir.path().join("abc123")).unwrap();
    assert_eq!(artifact, "first");
}

#[tokio::test]
async fn test_multiline_result_output_survives_the_wire() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = TestScheduler::start(test_scheduler_config(dir.path())).await;

    let output = "running 3 tests\ntest a ... ok\ntest b --- FAILED\n";
    scheduler
        .request(&Message::Result {
            commit: "abc123".to_string(),
            output: output.to_string(),
        })
        .await;

    let artifact = std::fs::read_to_string(dir.path().join("abc123")).unwrap();
    assert_eq!(artifact, output);
}

#[tokio::test]
async fn test_malformed_request_is_dropped_without_reply() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = TestScheduler::start(test_scheduler_config(dir.path())).await;

    let mut stream = tokio::net::TcpStream::connect(&scheduler.addr).await.unwrap();
    stream.write_all(b"BOGUS-payload\n").await.unwrap();

    // The connection closes with no reply on it.
    let reply = protocol::read_message(&mut stream).await;
    assert!(reply.is_err());

    // Other connections are unaffected.
    assert_eq!(scheduler.request(&Message::Status).await, Message::Okay);
}
