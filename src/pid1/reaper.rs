//! Zombie process reaping
//!
//! As PID 1, orphans get reparented to us and must be waited for. Outside of
//! PID 1 only the supervised init process is ours to reap; waiting on -1 there
//! would steal children other code is waiting for.

use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

/// Information about a reaped process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReapedProcess {
    pub pid: i32,
    pub status: WaitResult,
}

/// Exit status of a reaped process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// Process exited normally with code
    Exited(i32),
    /// Process killed by signal
    Signaled(i32),
}

impl WaitResult {
    /// Shell-style exit code
    pub fn exit_code(self) -> i32 {
        match self {
            WaitResult::Exited(code) => code,
            WaitResult::Signaled(sig) => 128 + sig,
        }
    }
}

/// Which children a reaper may wait for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapScope {
    /// Any child (PID 1 only)
    All,
    /// A single known child
    Only(i32),
}

/// Zombie process reaper
#[derive(Debug, Clone, Copy)]
pub struct ZombieReaper {
    scope: ReapScope,
}

impl ZombieReaper {
    pub fn new(scope: ReapScope) -> Self {
        Self { scope }
    }

    pub fn scope(&self) -> ReapScope {
        self.scope
    }

    /// Reap all available zombies in scope (non-blocking)
    pub fn reap_all(&self) -> Vec<ReapedProcess> {
        let target = match self.scope {
            ReapScope::All => Pid::from_raw(-1),
            ReapScope::Only(pid) => Pid::from_raw(pid),
        };

        let mut reaped = Vec::new();

        loop {
            match waitpid(target, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => break,
                Ok(WaitStatus::Exited(pid, code)) => {
                    log::debug!("Reaped PID {} (exited {})", pid, code);
                    reaped.push(ReapedProcess {
                        pid: pid.as_raw(),
                        status: WaitResult::Exited(code),
                    });
                }
                Ok(WaitStatus::Signaled(pid, sig, _)) => {
                    log::debug!("Reaped PID {} (killed by {})", pid, sig);
                    reaped.push(ReapedProcess {
                        pid: pid.as_raw(),
                        status: WaitResult::Signaled(sig as i32),
                    });
                }
                // Stop/continue notifications are not reported without WUNTRACED
                Ok(_) => continue,
                Err(nix::errno::Errno::ECHILD) => break,
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => {
                    log::error!("waitpid error: {}", e);
                    break;
                }
            }

            if matches!(self.scope, ReapScope::Only(_)) {
                break;
            }
        }

        reaped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use std::time::{Duration, Instant};

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(WaitResult::Exited(3).exit_code(), 3);
        assert_eq!(WaitResult::Signaled(libc::SIGTERM).exit_code(), 143);
    }

    #[test]
    fn test_reap_single_child() {
        let child = Command::new("sh").args(["-c", "exit 4"]).spawn().unwrap();
        let pid = child.id() as i32;
        let reaper = ZombieReaper::new(ReapScope::Only(pid));

        let deadline = Instant::now() + Duration::from_secs(5);
        let reaped = loop {
            let reaped = reaper.reap_all();
            if !reaped.is_empty() || Instant::now() > deadline {
                break reaped;
            }
            std::thread::sleep(Duration::from_millis(20));
        };

        assert_eq!(
            reaped,
            vec![ReapedProcess {
                pid,
                status: WaitResult::Exited(4)
            }]
        );
    }
}
