//! Integration tests for `capsule serve` lifecycle: pidfile and signals.

use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn capsule_binary() -> std::path::PathBuf {
    assert_cmd::cargo::cargo_bin!("capsule").into()
}

fn spawn_serve(data_dir: &TempDir) -> std::process::Child {
    Command::new(capsule_binary())
        .args(["serve", "--port", "0"])
        .env("CAPSULE_DATA_DIR", data_dir.path())
        .env_remove("PORT")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn capsule serve")
}

/// Wait for the pidfile to appear, indicating the server process has started.
fn wait_for_pidfile(data_dir: &TempDir) {
    let pidfile = data_dir.path().join("capsule-serve.pid");
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if pidfile.exists() {
            // give the listener a moment to bind
            std::thread::sleep(Duration::from_millis(200));
            return;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

#[cfg(unix)]
fn send_signal(child: &std::process::Child, signal: libc::c_int) {
    unsafe {
        libc::kill(child.id() as libc::pid_t, signal);
    }
}

#[cfg(unix)]
#[test]
fn serve_exits_on_sigterm() {
    let dir = TempDir::new().unwrap();
    let mut child = spawn_serve(&dir);
    wait_for_pidfile(&dir);

    send_signal(&child, libc::SIGTERM);

    let start = Instant::now();
    let status = child.wait().expect("wait");
    let elapsed = start.elapsed();

    assert!(status.success(), "SIGTERM should exit 0, got {status}");
    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
}

#[cfg(unix)]
#[test]
fn pidfile_created_and_removed_on_exit() {
    let dir = TempDir::new().unwrap();
    let pidfile = dir.path().join("capsule-serve.pid");

    let mut child = spawn_serve(&dir);
    wait_for_pidfile(&dir);

    assert!(pidfile.exists(), "pidfile should exist while server runs");
    let file_pid: u32 = std::fs::read_to_string(&pidfile)
        .unwrap()
        .trim()
        .parse()
        .expect("pidfile should contain a PID");
    assert_eq!(file_pid, child.id(), "pidfile PID should match child PID");

    send_signal(&child, libc::SIGINT);
    child.wait().expect("wait");

    assert!(
        !pidfile.exists(),
        "pidfile should be removed after clean shutdown"
    );
}

#[cfg(unix)]
#[test]
fn wal_checkpoint_on_exit() {
    let dir = TempDir::new().unwrap();

    #[allow(deprecated)]
    assert_cmd::Command::cargo_bin("capsule")
        .unwrap()
        .env("CAPSULE_DATA_DIR", dir.path())
        .args(["create", "--title", "before serve"])
        .assert()
        .success();

    let mut child = spawn_serve(&dir);
    wait_for_pidfile(&dir);
    send_signal(&child, libc::SIGTERM);
    child.wait().expect("wait");

    let wal = dir.path().join("data").join("knowledge_capsules.db-wal");
    if wal.exists() {
        let size = std::fs::metadata(&wal).unwrap().len();
        assert_eq!(size, 0, "WAL should be truncated after clean exit");
    }
}

#[cfg(unix)]
#[test]
fn stale_pidfile_is_replaced() {
    let dir = TempDir::new().unwrap();
    let pidfile = dir.path().join("capsule-serve.pid");
    std::fs::write(&pidfile, "0").unwrap();

    let mut child = spawn_serve(&dir);
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut recorded = String::new();
    while Instant::now() < deadline {
        recorded = std::fs::read_to_string(&pidfile).unwrap_or_default();
        if recorded.trim() == child.id().to_string() {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    assert_eq!(recorded.trim(), child.id().to_string());
    std::thread::sleep(Duration::from_millis(200));

    send_signal(&child, libc::SIGTERM);
    child.wait().expect("wait");
    assert!(!pidfile.exists());
}
