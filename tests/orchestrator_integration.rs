//! Integration tests for the vm-init binary
//!
//! Prebuild runs against a throwaway root. Runtime mode runs a shell script as
//! the init system; the test process is not PID 1, so vm-init supervises it.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use pcss_vm::units::declared::PLAN;

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

fn unique_test_dir() -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = PathBuf::from(format!("/tmp/vm-init-test-{}-{}", std::process::id(), id));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Root with an installable unit file for everything the image enables
fn image_root() -> PathBuf {
    let root = unique_test_dir();
    let units = root.join("usr/lib/systemd/system");
    fs::create_dir_all(&units).unwrap();
    for unit in PLAN.enable {
        fs::write(
            units.join(unit),
            "[Service]\nExecStart=/bin/true\n\n[Install]\nWantedBy=multi-user.target\n",
        )
        .unwrap();
    }
    root
}

fn vm_init(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_vm-init"))
        .args(args)
        .env("VM_INIT_ROOT", root)
        .env("RUST_LOG", "info")
        .output()
        .unwrap()
}

#[test]
fn test_prebuild_twice_second_run_is_noop() {
    let root = image_root();

    let first = vm_init(&root, &["prebuild"]);
    assert!(first.status.success(), "stderr: {}", String::from_utf8_lossy(&first.stderr));
    let stdout = String::from_utf8_lossy(&first.stdout);
    assert_eq!(stdout.lines().count(), PLAN.enable.len() + PLAN.mask.len());

    let second = vm_init(&root, &["prebuild"]);
    assert!(second.status.success());
    assert_eq!(String::from_utf8_lossy(&second.stdout).trim(), "No unit changes");

    let wants = root.join("etc/systemd/system/multi-user.target.wants");
    for unit in PLAN.enable {
        assert!(wants.join(unit).is_symlink(), "{} not enabled", unit);
    }
    for unit in PLAN.mask {
        assert_eq!(
            fs::read_link(root.join("etc/systemd/system").join(unit)).unwrap(),
            Path::new("/dev/null")
        );
    }
}

#[test]
fn test_unknown_mode_fails_without_mutation() {
    let root = image_root();

    let out = vm_init(&root, &["bogus"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("bogus"));

    assert!(!root.join("etc").exists());
    assert!(!root.join("var").exists());
}

#[test]
fn test_prebuild_fails_loudly_on_broken_image() {
    // No unit files at all
    let root = unique_test_dir();

    let out = vm_init(&root, &["prebuild"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("Unit operation failed"));
}

#[test]
fn test_extra_arguments_are_rejected() {
    let root = image_root();

    let out = vm_init(&root, &["prebuild", "again"]);
    assert!(!out.status.success());
    assert!(!root.join("etc").exists());
}

/// Poll a child without blocking until it exits or `limit` passes
fn wait_exit(pid: Pid, limit: Duration) -> Option<WaitStatus> {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)).unwrap() {
            WaitStatus::StillAlive => thread::sleep(Duration::from_millis(20)),
            status => return Some(status),
        }
    }
    None
}

#[test]
fn test_runtime_stop_signal_halts_init_and_passes_status() {
    let root = image_root();
    let stop = libc::SIGRTMIN() + 3;
    // Exits 5 on the stop signal, shrugs off SIGTERM
    let script = format!(
        "trap 'exit 5' {}; trap 'echo term' TERM; echo ready; while :; do sleep 0.05; done",
        stop
    );
    let init = shlex::try_join(["sh", "-c", script.as_str()]).unwrap();

    let mut child = Command::new(env!("CARGO_BIN_EXE_vm-init"))
        .args(["--init", &init])
        .env("VM_INIT_ROOT", &root)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    let pid = Pid::from_raw(child.id() as i32);

    let mut lines = BufReader::new(child.stdout.take().unwrap()).lines();
    assert_eq!(lines.next().unwrap().unwrap(), "ready");

    // SIGTERM reaches vm-init only and is ignored
    kill(pid, Signal::SIGTERM).unwrap();
    assert_eq!(wait_exit(pid, Duration::from_millis(500)), None, "vm-init exited on SIGTERM");

    assert_eq!(unsafe { libc::kill(pid.as_raw(), stop) }, 0);
    assert_eq!(
        wait_exit(pid, Duration::from_secs(5)),
        Some(WaitStatus::Exited(pid, 5))
    );
    // Output from the SIGTERM trap would mean the signal was passed on
    assert!(lines.map_while(Result::ok).all(|line| line != "term"));
}
