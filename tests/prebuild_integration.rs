//! Integration tests for prebuild: enabling and masking units under a fake root

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use pcss_vm::manager::{Manager, ManagerError, UnitChange};
use pcss_vm::orchestrator::{self, stamp_path, OrchestratorError};
use pcss_vm::units::declared::UnitPlan;
use pcss_vm::units::UnitState;
use tokio_test::{assert_err, assert_ok};

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

fn unique_test_dir() -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = PathBuf::from(format!("/tmp/pcss-vm-test-{}-{}", std::process::id(), id));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_unit(root: &Path, name: &str, content: &str) -> PathBuf {
    let dir = root.join("lib/systemd/system");
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

const PCSS_UNIT: &str = r#"
[Unit]
Description=PCSS interpreter service
After=network-online.target

[Service]
ExecStart=/usr/local/bin/pcssd -- python3 -u /opt/pcss/worker.py

[Install]
WantedBy=multi-user.target
Also=pcss-tmpfiles.service
"#;

const TMPFILES_UNIT: &str = r#"
[Service]
Type=oneshot
ExecStart=/bin/true

[Install]
RequiredBy=pcss.service
"#;

const SSH_UNIT: &str = r#"
[Service]
ExecStart=/usr/sbin/sshd -D

[Install]
WantedBy=multi-user.target
Alias=sshd.service
"#;

fn test_plan() -> UnitPlan<'static> {
    UnitPlan {
        enable: &["pcss.service", "ssh"],
        mask: &["getty.target", "systemd-firstboot.service"],
    }
}

fn populated_root() -> PathBuf {
    let root = unique_test_dir();
    write_unit(&root, "pcss.service", PCSS_UNIT);
    write_unit(&root, "pcss-tmpfiles.service", TMPFILES_UNIT);
    write_unit(&root, "ssh.service", SSH_UNIT);
    write_unit(&root, "getty.target", "[Unit]\nDescription=Login Prompts\n");
    root
}

#[tokio::test]
async fn test_prebuild_enables_and_masks() {
    let root = populated_root();
    let manager = Manager::with_root(&root);

    let report = assert_ok!(orchestrator::prebuild(&manager, &test_plan()).await);
    assert!(report.stamped);
    assert!(!report.is_noop());

    let etc = root.join("etc/systemd/system");
    assert_eq!(
        fs::read_link(etc.join("multi-user.target.wants/pcss.service")).unwrap(),
        Path::new("/lib/systemd/system/pcss.service")
    );
    assert_eq!(
        fs::read_link(etc.join("pcss.service.requires/pcss-tmpfiles.service")).unwrap(),
        Path::new("/lib/systemd/system/pcss-tmpfiles.service")
    );
    assert_eq!(
        fs::read_link(etc.join("sshd.service")).unwrap(),
        Path::new("/lib/systemd/system/ssh.service")
    );
    assert_eq!(fs::read_link(etc.join("getty.target")).unwrap(), Path::new("/dev/null"));
    // Masking does not need a unit file to exist
    assert_eq!(
        fs::read_link(etc.join("systemd-firstboot.service")).unwrap(),
        Path::new("/dev/null")
    );

    assert_eq!(manager.unit_state("pcss").await.unwrap(), UnitState::Enabled);
    assert_eq!(manager.unit_state("ssh.service").await.unwrap(), UnitState::Enabled);
    assert_eq!(manager.unit_state("getty.target").await.unwrap(), UnitState::Masked);
    assert!(stamp_path(&root).exists());
}

#[tokio::test]
async fn test_prebuild_twice_reports_no_changes() {
    let root = populated_root();
    let manager = Manager::with_root(&root);

    let first = assert_ok!(orchestrator::prebuild(&manager, &test_plan()).await);
    assert_eq!(first.changes.len(), 6);

    let stamp = fs::read_to_string(stamp_path(&root)).unwrap();

    let second = assert_ok!(orchestrator::prebuild(&manager, &test_plan()).await);
    assert!(second.is_noop(), "unexpected changes: {:?}", second.changes);
    assert!(!second.stamped);
    assert_eq!(fs::read_to_string(stamp_path(&root)).unwrap(), stamp);
}

#[tokio::test]
async fn test_stale_link_is_replaced() {
    let root = populated_root();
    let manager = Manager::with_root(&root);

    let wants = root.join("etc/systemd/system/multi-user.target.wants");
    fs::create_dir_all(&wants).unwrap();
    std::os::unix::fs::symlink("/old/pcss.service", wants.join("pcss.service")).unwrap();

    let changes = manager.enable("pcss.service").await.unwrap();
    assert!(changes.iter().any(|c| matches!(
        c,
        UnitChange::Replaced { link, .. } if link.ends_with("multi-user.target.wants/pcss.service")
    )));
}

#[tokio::test]
async fn test_missing_unit_fails_prebuild() {
    let root = populated_root();
    let manager = Manager::with_root(&root);
    let plan = UnitPlan {
        enable: &["does-not-exist.service"],
        mask: &[],
    };

    let err = assert_err!(orchestrator::prebuild(&manager, &plan).await);
    assert!(matches!(
        err,
        OrchestratorError::UnitOperationFailed { ref unit, source: ManagerError::NotFound(_) }
            if unit == "does-not-exist.service"
    ));
    assert!(!stamp_path(&root).exists());
}

#[tokio::test]
async fn test_unit_without_install_section_fails() {
    let root = populated_root();
    write_unit(&root, "static.service", "[Service]\nExecStart=/bin/true\n");
    let manager = Manager::with_root(&root);

    let err = manager.enable("static.service").await.unwrap_err();
    assert!(matches!(err, ManagerError::NoInstallSection(_)));
    assert_eq!(manager.unit_state("static").await.unwrap(), UnitState::Disabled);
}

#[tokio::test]
async fn test_mask_refuses_to_overwrite_unit_file() {
    let root = populated_root();
    let etc = root.join("etc/systemd/system");
    fs::create_dir_all(&etc).unwrap();
    fs::write(etc.join("local.service"), "[Service]\nExecStart=/bin/true\n").unwrap();
    let manager = Manager::with_root(&root);

    let err = manager.mask("local.service").await.unwrap_err();
    assert!(matches!(err, ManagerError::LinkConflict(_)));
    // Untouched
    assert!(!etc.join("local.service").is_symlink());
}

#[tokio::test]
async fn test_enabling_masked_unit_fails() {
    let root = populated_root();
    let manager = Manager::with_root(&root);

    manager.mask("ssh").await.unwrap();
    let err = manager.enable("ssh").await.unwrap_err();
    assert!(matches!(err, ManagerError::Masked(_)));
}
