//! Integration tests for spawning and supervising processes.
//!
//! Validates:
//! - the registry holds exactly one entry while the child runs and none
//!   once `wait` resolves
//! - stdout/stderr capture, stdin forwarding, cwd and env handling
//! - the audit event arrives after registry cleanup and before `wait`
//!   resolves
//! - audit failures never block completion
//! - managers sharing a registry file never lose each other's entries
//! - a background grandchild holding the pipes does not delay exit

#![cfg(unix)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use command_gate::models::process::ProcessState;
use command_gate::process::{ProcessManager, SpawnOptions};
use command_gate::AppError;

use super::test_helpers::{manager_with_sink, registry_path, strings, FailingSink};

const GRACE: Duration = Duration::from_millis(500);

#[tokio::test]
async fn captures_output_and_exit_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (manager, _sink) = manager_with_sink(temp.path(), GRACE);

    let handle = manager
        .spawn_process(SpawnOptions::new(
            "sh",
            strings(&["-c", "echo out; echo err >&2; exit 3"]),
        ))
        .await
        .expect("spawn");
    let exit = handle.wait().await.expect("wait");

    assert_eq!(exit.exit_code, Some(3));
    assert_eq!(exit.signal, None);
    assert!(!exit.success());
    assert!(!exit.timed_out);
    assert!(!exit.cancelled);
    assert_eq!(handle.stdout(), "out\n");
    assert_eq!(handle.stderr(), "err\n");
}

#[tokio::test]
async fn registry_tracks_live_process_only() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (manager, _sink) = manager_with_sink(temp.path(), GRACE);

    let handle = manager
        .spawn_process(SpawnOptions::new("sleep", strings(&["5"])).with_run_id("run-7"))
        .await
        .expect("spawn");

    let live = manager.registry().list().await;
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].pid, handle.pid());
    assert_eq!(live[0].run_id.as_deref(), Some("run-7"));
    assert_eq!(handle.state(), ProcessState::Running);
    assert!(handle.try_exit().is_none());

    handle.cancel();
    handle.wait().await.expect("wait");

    assert!(manager.registry().list().await.is_empty());
    assert_eq!(handle.state(), ProcessState::Terminated);
}

#[tokio::test]
async fn stdin_is_forwarded() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (manager, _sink) = manager_with_sink(temp.path(), GRACE);

    let handle = manager
        .spawn_process(SpawnOptions::new("cat", Vec::new()))
        .await
        .expect("spawn");
    handle.write_stdin(b"ping\n").await.expect("write");
    handle.close_stdin().await;
    let exit = handle.wait().await.expect("wait");

    assert!(exit.success());
    assert_eq!(handle.stdout(), "ping\n");
    assert!(matches!(
        handle.write_stdin(b"late").await,
        Err(AppError::Io(_))
    ));
}

#[tokio::test]
async fn runs_in_requested_cwd() {
    let temp = tempfile::tempdir().expect("tempdir");
    let work = tempfile::tempdir().expect("workdir");
    std::fs::write(work.path().join("marker.txt"), "").expect("write marker");
    let (manager, _sink) = manager_with_sink(temp.path(), GRACE);

    let handle = manager
        .spawn_process(SpawnOptions::new("ls", Vec::new()).with_cwd(work.path()))
        .await
        .expect("spawn");
    handle.wait().await.expect("wait");

    assert!(handle.stdout().contains("marker.txt"));
}

#[tokio::test]
async fn env_replaces_inherited_environment() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (manager, _sink) = manager_with_sink(temp.path(), GRACE);
    let env = HashMap::from([("GATE_VAR".to_owned(), "set".to_owned())]);

    let handle = manager
        .spawn_process(
            SpawnOptions::new(
                "/bin/sh",
                strings(&["-c", "echo \"$GATE_VAR:${HOME:-unset}\""]),
            )
            .with_env(env),
        )
        .await
        .expect("spawn");
    handle.wait().await.expect("wait");

    assert_eq!(handle.stdout(), "set:unset\n");
}

#[tokio::test]
async fn empty_command_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (manager, _sink) = manager_with_sink(temp.path(), GRACE);

    let result = manager.spawn_process(SpawnOptions::new("", Vec::new())).await;

    assert!(matches!(result, Err(AppError::CommandEmpty(_))));
    assert!(manager.registry().list().await.is_empty());
}

#[tokio::test]
async fn spawn_failure_leaves_no_registry_entry() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (manager, sink) = manager_with_sink(temp.path(), GRACE);

    let result = manager
        .spawn_process(SpawnOptions::new("/nonexistent/command-gate-test", Vec::new()))
        .await;

    assert!(matches!(result, Err(AppError::Spawn(_))));
    assert!(manager.registry().list().await.is_empty());
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn audit_follows_registry_cleanup_and_precedes_wait() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (manager, sink) = manager_with_sink(temp.path(), GRACE);

    let handle = manager
        .spawn_process(
            SpawnOptions::new("sh", strings(&["-c", "exit 0"]))
                .with_run_id("run-1")
                .with_node_id("node-1"),
        )
        .await
        .expect("spawn");
    handle.wait().await.expect("wait");

    let events = sink.events();
    assert_eq!(events.len(), 1, "exactly one audit event per process");
    let (event, live_entries) = &events[0];
    assert_eq!(*live_entries, 0, "registry entry removed before audit");
    assert_eq!(event.pid, handle.pid());
    assert_eq!(event.exit_code, Some(0));
    assert_eq!(event.run_id.as_deref(), Some("run-1"));
    assert_eq!(event.node_id.as_deref(), Some("node-1"));
}

#[tokio::test]
async fn failing_audit_sink_does_not_block_exit() {
    let temp = tempfile::tempdir().expect("tempdir");
    let manager = ProcessManager::new(registry_path(temp.path()))
        .with_audit_sink(Arc::new(FailingSink));

    let handle = manager
        .spawn_process(SpawnOptions::new("true", Vec::new()))
        .await
        .expect("spawn");
    let exit = handle.wait().await.expect("wait despite audit failure");

    assert!(exit.success());
    assert!(manager.registry().list().await.is_empty());
}

#[tokio::test]
async fn every_clone_observes_the_same_exit() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (manager, sink) = manager_with_sink(temp.path(), GRACE);

    let handle = manager
        .spawn_process(SpawnOptions::new("sh", strings(&["-c", "sleep 0.1; exit 4"])))
        .await
        .expect("spawn");
    let other = handle.clone();

    let (a, b) = tokio::join!(handle.wait(), other.wait());
    assert_eq!(a.expect("first wait"), b.expect("second wait"));
    assert_eq!(handle.try_exit().and_then(|exit| exit.exit_code), Some(4));
    assert_eq!(sink.events().len(), 1);
}

#[tokio::test]
async fn concurrent_spawns_share_one_registry() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (manager, sink) = manager_with_sink(temp.path(), GRACE);

    let mut handles = Vec::new();
    for _ in 0..4 {
        handles.push(
            manager
                .spawn_process(SpawnOptions::new("sleep", strings(&["0.2"])))
                .await
                .expect("spawn"),
        );
    }
    assert_eq!(manager.registry().list().await.len(), 4);

    for handle in &handles {
        handle.wait().await.expect("wait");
    }
    assert!(manager.registry().list().await.is_empty());
    assert_eq!(sink.events().len(), 4);
}

#[tokio::test]
async fn managers_sharing_a_registry_file_keep_every_entry() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (first, first_sink) = manager_with_sink(temp.path(), GRACE);
    let (second, second_sink) = manager_with_sink(temp.path(), GRACE);
    let (first, second) = (Arc::new(first), Arc::new(second));

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let manager = Arc::clone(if i % 2 == 0 { &first } else { &second });
            tokio::spawn(async move {
                manager
                    .spawn_process(SpawnOptions::new("sleep", strings(&["5"])))
                    .await
            })
        })
        .collect();
    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.expect("join").expect("spawn"));
    }

    let mut live: Vec<u32> = first.registry().list().await.iter().map(|r| r.pid).collect();
    let mut expected: Vec<u32> = handles.iter().map(|h| h.pid()).collect();
    live.sort_unstable();
    expected.sort_unstable();
    assert_eq!(live, expected);

    for handle in &handles {
        handle.cancel();
    }
    for handle in &handles {
        handle.wait().await.expect("wait");
    }
    assert!(first.registry().list().await.is_empty());
    assert!(second.registry().list().await.is_empty());
    assert_eq!(first_sink.events().len() + second_sink.events().len(), 8);
}

#[tokio::test]
async fn background_grandchild_does_not_hold_up_exit() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (manager, sink) = manager_with_sink(temp.path(), GRACE);

    let started = Instant::now();
    let handle = manager
        .spawn_process(SpawnOptions::new("sh", strings(&["-c", "sleep 20 &"])))
        .await
        .expect("spawn");
    let exit = handle.wait().await.expect("wait");
    let waited = started.elapsed();

    assert_eq!(exit.exit_code, Some(0));
    assert!(
        waited < Duration::from_millis(1800),
        "stdio drain is bounded by one shared deadline, waited {waited:?}"
    );
    assert!(manager.registry().list().await.is_empty());

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert!(
        events[0].0.duration_ms < 500,
        "duration stops at child exit, got {} ms",
        events[0].0.duration_ms
    );
}
