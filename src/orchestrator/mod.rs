//! Init orchestrator
//!
//! Entry logic for the container's first process. The phase is picked once
//! from the command line and never changes:
//! - `prebuild`: enable/mask the declared units, write the build stamp, exit
//! - no argument: exec the init system (as PID 1) or supervise it until it exits

mod prebuild;
mod runtime;

pub use prebuild::{prebuild, stamp_path, PrebuildReport, STAMP_PATH};
pub use runtime::{run_runtime, supervise, Handoff, RuntimeConfig, DEFAULT_INIT};

use std::io;

use crate::manager::ManagerError;

/// Which code path this invocation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServicePhase {
    Prebuild,
    Runtime,
}

impl ServicePhase {
    /// Pick the phase from the single optional mode argument
    pub fn from_arg(mode: Option<&str>) -> Result<Self, OrchestratorError> {
        match mode {
            None => Ok(ServicePhase::Runtime),
            Some("prebuild") => Ok(ServicePhase::Prebuild),
            Some(other) => Err(OrchestratorError::UnknownMode(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Unknown mode '{0}' (expected 'prebuild' or no argument)")]
    UnknownMode(String),

    #[error("Unit operation failed for {unit}: {source}")]
    UnitOperationFailed {
        unit: String,
        #[source]
        source: ManagerError,
    },

    #[error("Failed to start init system: {0}")]
    InitSpawn(#[source] io::Error),

    #[error("Signal setup failed: {0}")]
    Signal(#[source] io::Error),

    #[error("Failed to write prebuild stamp: {0}")]
    Stamp(#[source] io::Error),
}
