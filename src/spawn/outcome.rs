//! Worker lifecycle state and run outcomes

use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::{Duration, Instant};

use super::{SpawnError, WorkerCommand};

/// Current status of a worker process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Running,
    /// SIGTERM sent, grace countdown running
    GracefullyStopping,
    /// SIGKILL sent
    Killed,
    ExitedNormally,
}

/// How a worker run ended
#[derive(Debug)]
pub enum ExitOutcome {
    /// Exited on its own before the soft timeout
    ExitedNormally(i32),
    /// Exited within the grace period after SIGTERM (None if killed by the signal)
    TimedOutGraceful(Option<i32>),
    /// Still alive after the grace period, SIGKILLed
    TimedOutKilled,
    /// The connection went away before the worker exited
    PeerClosed { killed: bool },
    /// The process could not be created
    SpawnFailed(SpawnError),
}

impl ExitOutcome {
    /// Whether the policy had to step in
    pub fn timed_out(&self) -> bool {
        matches!(self, Self::TimedOutGraceful(_) | Self::TimedOutKilled)
    }
}

/// Bookkeeping for one spawned worker
#[derive(Debug)]
pub struct WorkerProcess {
    pub pid: u32,
    pub command: WorkerCommand,
    pub started_at: Instant,
    pub soft_timeout: Duration,
    pub grace_timeout: Duration,
    pub status: WorkerStatus,
}

impl WorkerProcess {
    pub(super) fn new(pid: u32, command: WorkerCommand, soft: Duration, grace: Duration) -> Self {
        Self {
            pid,
            command,
            started_at: Instant::now(),
            soft_timeout: soft,
            grace_timeout: grace,
            status: WorkerStatus::Running,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub(super) fn set_stopping(&mut self) {
        self.status = WorkerStatus::GracefullyStopping;
    }

    pub(super) fn set_killed(&mut self) {
        self.status = WorkerStatus::Killed;
    }

    pub(super) fn set_exited(&mut self) {
        if self.status == WorkerStatus::Running {
            self.status = WorkerStatus::ExitedNormally;
        }
    }
}

/// Shell-style exit code: the real code, or 128 + signal number
pub fn exit_code(status: ExitStatus) -> i32 {
    match status.code() {
        Some(code) => code,
        None => 128 + status.signal().unwrap_or(0),
    }
}
