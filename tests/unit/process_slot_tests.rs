//! Unit tests for the single-occupancy process slot.

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use devrun::supervisor::{ProcessExit, ProcessSlot, ServerProcess};
use devrun::watch::LivenessGate;

fn spawn(slot: &ProcessSlot, script: &str) -> ServerProcess {
    let child = tokio::process::Command::new("/bin/sh")
        .args(["-c", script])
        .kill_on_drop(true)
        .spawn()
        .expect("spawn");
    ServerProcess::adopt(slot.next_id(), child, Duration::from_secs(2))
}

#[test]
fn exit_classification() {
    let requested = ProcessExit {
        code: None,
        requested: true,
    };
    let crashed = ProcessExit {
        code: Some(3),
        requested: false,
    };
    let clean = ProcessExit {
        code: Some(0),
        requested: false,
    };
    let signalled = ProcessExit {
        code: None,
        requested: false,
    };

    assert!(!requested.is_failure());
    assert!(crashed.is_failure());
    assert!(!clean.is_failure());
    assert!(signalled.is_failure());
    assert_eq!(signalled.code_or_signal(), -1);
    assert_eq!(crashed.code_or_signal(), 3);
}

#[tokio::test]
async fn terminate_on_empty_slot_is_noop() {
    let slot = ProcessSlot::new();
    assert!(!slot.terminate());
    assert_eq!(slot.destroyed_count(), 0);
}

#[tokio::test]
async fn install_rejects_second_process() {
    let slot = ProcessSlot::new();
    slot.install(spawn(&slot, "exec sleep 30")).expect("first");
    let rejected = slot
        .install(spawn(&slot, "exec sleep 30"))
        .expect_err("occupied");
    assert_eq!(slot.current_id(), Some(1));
    assert_eq!(rejected.id(), 2);
    assert!(slot.terminate());
}

#[tokio::test]
async fn terminated_process_reports_requested_exit() {
    let slot = ProcessSlot::new();
    let process = spawn(&slot, "exec sleep 30");
    let mut exit = process.exit_watch();
    slot.install(process).expect("install");
    assert!(slot.is_live());

    assert!(slot.terminate());
    let exit = tokio::time::timeout(Duration::from_secs(5), exit.wait())
        .await
        .expect("exit within grace");

    assert!(exit.requested);
    assert!(!exit.is_failure());
    assert!(!slot.is_present());
    assert!(!slot.is_live());
}

#[tokio::test]
async fn natural_exit_keeps_handle() {
    let slot = ProcessSlot::new();
    let process = spawn(&slot, "exit 4");
    let mut exit = process.exit_watch();
    slot.install(process).expect("install");

    let exit = tokio::time::timeout(Duration::from_secs(5), exit.wait())
        .await
        .expect("exit");

    assert_eq!(exit.code, Some(4));
    assert!(!exit.requested);
    assert!(slot.is_present());
    assert!(!slot.is_running());
    assert!(slot.terminate());
}

#[tokio::test]
async fn stubborn_process_is_killed_after_grace() {
    let slot = ProcessSlot::new();
    let child = tokio::process::Command::new("/bin/sh")
        .args(["-c", "trap '' TERM; while true; do sleep 1; done"])
        .kill_on_drop(true)
        .spawn()
        .expect("spawn");
    let process = ServerProcess::adopt(slot.next_id(), child, Duration::from_millis(200));
    let mut exit = process.exit_watch();
    slot.install(process).expect("install");
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(slot.terminate());
    let exit = tokio::time::timeout(Duration::from_secs(5), exit.wait())
        .await
        .expect("killed");

    assert!(exit.requested);
    assert_eq!(exit.code, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_terminate_destroys_once() {
    let slot = Arc::new(ProcessSlot::new());
    slot.install(spawn(&slot, "exec sleep 30")).expect("install");

    let tasks = (0..8)
        .map(|_| {
            let slot = Arc::clone(&slot);
            tokio::spawn(async move { slot.terminate() })
        })
        .collect::<Vec<_>>();

    let mut destroyed = 0;
    for task in tasks {
        if task.await.expect("join") {
            destroyed += 1;
        }
    }

    assert_eq!(destroyed, 1);
    assert_eq!(slot.destroyed_count(), 1);
    assert!(!slot.is_present());
}

#[tokio::test]
async fn terminate_process_matches_generation() {
    let slot = ProcessSlot::new();
    slot.install(spawn(&slot, "exec sleep 30")).expect("install");

    assert!(!slot.terminate_process(99));
    assert!(slot.is_present());
    assert!(slot.terminate_process(1));
    assert!(!slot.terminate_process(1));
}
