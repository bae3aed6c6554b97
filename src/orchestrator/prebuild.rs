//! One-time image setup

use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;

use super::OrchestratorError;
use crate::manager::{Manager, UnitChange};
use crate::units::declared::UnitPlan;

/// Written under the root once prebuild has completed
pub const STAMP_PATH: &str = "var/lib/pcss-vm/prebuilt";

/// What a prebuild run changed
#[derive(Debug, Default)]
pub struct PrebuildReport {
    pub changes: Vec<UnitChange>,
    /// Stamp was created by this run
    pub stamped: bool,
}

impl PrebuildReport {
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }
}

pub fn stamp_path(root: &Path) -> PathBuf {
    root.join(STAMP_PATH)
}

/// Enable and mask the planned units, then stamp the image.
///
/// Stops at the first unit that cannot be handled; the image is broken then.
pub async fn prebuild(manager: &Manager, plan: &UnitPlan<'_>) -> Result<PrebuildReport, OrchestratorError> {
    let mut report = PrebuildReport::default();

    for unit in plan.mask {
        let changes = manager
            .mask(unit)
            .await
            .map_err(|source| OrchestratorError::UnitOperationFailed {
                unit: unit.to_string(),
                source,
            })?;
        if changes.is_empty() {
            log::debug!("{} already masked", unit);
        }
        report.changes.extend(changes);
    }

    for unit in plan.enable {
        let changes = manager
            .enable(unit)
            .await
            .map_err(|source| OrchestratorError::UnitOperationFailed {
                unit: unit.to_string(),
                source,
            })?;
        if changes.is_empty() {
            log::debug!("{} already enabled", unit);
        }
        report.changes.extend(changes);
    }

    for change in &report.changes {
        log::info!("{}", change);
    }

    report.stamped = write_stamp(&stamp_path(manager.root())).map_err(OrchestratorError::Stamp)?;

    log::info!(
        "Prebuild complete: {} unit change(s){}",
        report.changes.len(),
        if report.stamped { ", image stamped" } else { "" }
    );
    Ok(report)
}

/// Create the stamp if missing; returns whether it was created
fn write_stamp(path: &Path) -> io::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format!("{}\n", Utc::now().to_rfc3339()))?;
    Ok(true)
}
