//! PID 1 functionality
//!
//! Handles responsibilities specific to running as the container entrypoint:
//! - Zombie process reaping
//! - Signal handling
//! - Handing shutdown requests to the init system

mod reaper;
mod shutdown;
mod signals;

pub use reaper::{ReapScope, ReapedProcess, WaitResult, ZombieReaper};
pub use shutdown::{InitProcess, InitSystem, ShutdownVia, SignalShutdown, SystemctlShutdown};
pub use signals::{stop_signal, SignalHandler, VmSignal};

use std::process;

/// Check if we are running as PID 1
pub fn is_pid1() -> bool {
    process::id() == 1
}
