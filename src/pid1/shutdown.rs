//! Shutdown requests to the supervised init system
//!
//! The init system owns the ordering of unit shutdown. All the entrypoint does
//! is ask it to stop, through whichever channel the environment provides.

use std::io;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};

use nix::unistd::Pid;

/// Something that can be asked to begin an orderly shutdown
pub trait InitSystem {
    fn request_shutdown(&self) -> io::Result<()>;
}

/// How shutdown requests reach the init system
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownVia {
    /// Send the stop signal to the init process (systemd halts on SIGRTMIN+3)
    Signal,
    /// Run `systemctl --no-block halt`
    Systemctl,
}

impl std::str::FromStr for ShutdownVia {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "signal" => Ok(ShutdownVia::Signal),
            "systemctl" => Ok(ShutdownVia::Systemctl),
            other => Err(format!("unknown shutdown method '{}' (expected signal or systemctl)", other)),
        }
    }
}

/// Sends a signal to the init process
#[derive(Debug, Clone, Copy)]
pub struct SignalShutdown {
    pub pid: i32,
    pub signal: libc::c_int,
}

impl InitSystem for SignalShutdown {
    fn request_shutdown(&self) -> io::Result<()> {
        log::info!("Sending signal {} to init (PID {})", self.signal, self.pid);
        send_signal(self.pid, self.signal)
    }
}

/// Asks systemd over its own control tool
///
/// The tool runs in the background; a failing exit status is logged, not
/// returned.
#[derive(Debug, Clone)]
pub struct SystemctlShutdown {
    pub program: String,
}

impl Default for SystemctlShutdown {
    fn default() -> Self {
        Self {
            program: "systemctl".to_string(),
        }
    }
}

impl InitSystem for SystemctlShutdown {
    fn request_shutdown(&self) -> io::Result<()> {
        log::info!("Requesting halt via {}", self.program);
        let mut child = tokio::process::Command::new(&self.program)
            .args(["--no-block", "halt"])
            .stdin(Stdio::null())
            .spawn()?;

        let program = self.program.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => log::debug!("{} halt accepted", program),
                Ok(status) => log::error!("{} halt failed: {}", program, status),
                Err(e) => log::error!("Failed to wait for {}: {}", program, e),
            }
        });
        Ok(())
    }
}

/// The init system running as our child
#[derive(Debug, Clone, Copy)]
pub struct InitProcess {
    pid: i32,
}

impl InitProcess {
    /// Start the init system. The caller reaps it.
    pub fn spawn(argv: &[String]) -> io::Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty init command"))?;

        let child = Command::new(program).args(args).spawn()?;
        let pid = child.id() as i32;
        // Dropping a std Child neither kills nor waits; the reaper collects it
        drop(child);

        log::info!("Started init system {} (PID {})", program, pid);
        Ok(Self { pid })
    }

    /// Replace this process with the init system, keeping our PID.
    ///
    /// Only returns if the exec failed.
    pub fn exec(argv: &[String]) -> io::Error {
        let Some((program, args)) = argv.split_first() else {
            return io::Error::new(io::ErrorKind::InvalidInput, "empty init command");
        };

        log::info!("Handing PID {} over to {}", std::process::id(), program);
        Command::new(program).args(args).exec()
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// Pass a signal straight through to the init process
    pub fn forward(&self, signal: libc::c_int) -> io::Result<()> {
        send_signal(self.pid, signal)
    }

    /// Build the shutdown adapter for this process
    pub fn shutdown_adapter(&self, via: &ShutdownVia, stop_signal: libc::c_int) -> Box<dyn InitSystem + Send + Sync> {
        match via {
            ShutdownVia::Signal => Box::new(SignalShutdown {
                pid: self.pid,
                signal: stop_signal,
            }),
            ShutdownVia::Systemctl => Box::new(SystemctlShutdown::default()),
        }
    }
}

/// kill(2) with raw signal numbers; realtime signals have no nix `Signal` variant
fn send_signal(pid: i32, signal: libc::c_int) -> io::Result<()> {
    let pid = Pid::from_raw(pid);
    let ret = unsafe { libc::kill(pid.as_raw(), signal) };
    if ret == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_via_parse() {
        assert_eq!("signal".parse::<ShutdownVia>(), Ok(ShutdownVia::Signal));
        assert_eq!("systemctl".parse::<ShutdownVia>(), Ok(ShutdownVia::Systemctl));
        assert!("reboot".parse::<ShutdownVia>().is_err());
    }

    #[test]
    fn test_spawn_rejects_empty_argv() {
        let err = InitProcess::spawn(&[]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_exec_rejects_empty_argv() {
        assert_eq!(InitProcess::exec(&[]).kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_exec_failure_returns() {
        let err = InitProcess::exec(&["/nonexistent/init".to_string()]);
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_systemctl_request_does_not_block() {
        let adapter = SystemctlShutdown {
            program: "sleep".to_string(),
        };
        // `sleep --no-block halt` fails in the background; the call returns at once
        let started = std::time::Instant::now();
        assert!(adapter.request_shutdown().is_ok());
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_systemctl_missing_tool_is_error() {
        let adapter = SystemctlShutdown {
            program: "/nonexistent/systemctl".to_string(),
        };
        assert!(adapter.request_shutdown().is_err());
    }
}
