//! A real master with a real forked worker. Kept to a single test: the master
//! reaps with waitpid(-1), so parallel tests here would steal each other's exits.

use daemon::{DaemonConfig, Event, Flow, LockError, LockGuard, State, Supervisor};
use nix::sys::signal::{kill, signal, SigHandler, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{getpid, Pid};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn wait_for_pid_file(path: &Path) -> Pid {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if let Ok(text) = std::fs::read_to_string(path) {
            return Pid::from_raw(text.trim().parse().unwrap());
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("worker never reported its pid in {}", path.display());
}

fn still_alive(pid: Pid) -> bool {
    waitpid(pid, Some(WaitPidFlag::WNOHANG)).unwrap() == WaitStatus::StillAlive
}

#[test]
fn forked_worker_lives_apart_from_the_master() {
    let dir = TempDir::new().unwrap();
    let lock_file = dir.path().join("daemon.lock");
    let pid_file = dir.path().join("daemon.pid");
    let report: PathBuf = dir.path().join("worker.pid");

    let cfg = DaemonConfig {
        worker_num: 1,
        auto_restart: false,
        runtime_root: dir.path().to_path_buf(),
        lock_file: Some(lock_file.display().to_string()),
        pid_file: Some(pid_file.display().to_string()),
        ..DaemonConfig::default()
    };

    let worker_report = report.clone();
    let mut sup = Supervisor::new(cfg).on_worker_start(move |me| {
        // the master stops workers with SIGQUIT; keep this one around until SIGKILL
        unsafe { signal(Signal::SIGQUIT, SigHandler::SigIgn) }.unwrap();
        let pid = if me.pid() == getpid() { me.pid().as_raw() } else { -1 };
        let tmp = worker_report.with_extension("tmp");
        std::fs::write(&tmp, pid.to_string()).unwrap();
        std::fs::rename(&tmp, &worker_report).unwrap();
        loop {
            std::thread::sleep(Duration::from_secs(30));
        }
    });

    let master = getpid();
    sup.start().unwrap();
    sup.listen().unwrap();
    assert_eq!(sup.spawn_workers(), 1);

    let mut tracked = Vec::new();
    sup.for_each_worker(|pid, _| tracked.push(pid));
    let worker = wait_for_pid_file(&report);
    assert_eq!(tracked, vec![worker]);
    assert_ne!(worker, master);

    // the worker closed its copy of the lock fd; the master still holds the lock
    assert!(sup.is_locked());
    assert!(matches!(
        LockGuard::acquire(Some(&lock_file)),
        Err(LockError::AlreadyHeld { .. })
    ));

    // SIGTERM to a worker is absorbed by the inherited handler and never reaches the master
    kill(worker, Signal::SIGTERM).unwrap();
    std::thread::sleep(Duration::from_millis(300));
    assert!(still_alive(worker));

    // master shutdown: SIGQUIT is ignored by this worker, so the pool is still waited on
    assert_eq!(sup.handle(Event::Terminate(Signal::SIGTERM)), Flow::Continue);
    assert_eq!(sup.state(), State::ShuttingDown);
    assert!(!sup.is_locked());
    assert!(!lock_file.exists());
    assert!(!pid_file.exists());
    assert!(still_alive(worker));

    let successor = LockGuard::acquire(Some(&lock_file)).unwrap();
    assert!(successor.is_held());
    drop(successor);

    kill(worker, Signal::SIGKILL).unwrap();
    assert_eq!(sup.next_event(), Some(Event::ChildExited));
    assert_eq!(sup.handle(Event::ChildExited), Flow::Exit(0));
    assert_eq!(sup.worker_count(), 0);
    assert_eq!(sup.state(), State::Stopped);
}
