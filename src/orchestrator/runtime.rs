//! Steady-state supervision of the init system

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;

use super::{stamp_path, OrchestratorError};
use crate::pid1::{
    self, stop_signal, InitProcess, InitSystem, ReapScope, ShutdownVia, SignalHandler, VmSignal,
    ZombieReaper,
};

/// systemd's main binary on Debian-family images
pub const DEFAULT_INIT: &str = "/lib/systemd/systemd";

/// Reap even if a SIGCHLD was coalesced or missed
const REAP_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub root: PathBuf,
    pub init_argv: Vec<String>,
    pub shutdown: ShutdownVia,
    /// Stay in front of the init system even as PID 1
    pub supervise: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
            init_argv: vec![DEFAULT_INIT.to_string()],
            shutdown: ShutdownVia::Signal,
            supervise: false,
        }
    }
}

/// How control passes to the init system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handoff {
    /// exec into it; systemd only runs the system manager as PID 1 and then
    /// handles SIGRTMIN+3 itself
    Exec,
    /// Run it as a child and translate signals for it
    Supervise,
}

impl Handoff {
    pub fn choose(is_pid1: bool, force_supervise: bool) -> Self {
        if is_pid1 && !force_supervise {
            Handoff::Exec
        } else {
            Handoff::Supervise
        }
    }
}

/// Hand control to the init system.
///
/// As PID 1 this execs the init system and only returns on failure. Otherwise
/// the init system runs as a child and its exit code is returned.
pub async fn run_runtime(config: &RuntimeConfig) -> Result<i32, OrchestratorError> {
    if !stamp_path(&config.root).exists() {
        log::warn!(
            "{} missing; this image was never prebuilt, units may be disabled",
            stamp_path(&config.root).display()
        );
    }

    let as_pid1 = pid1::is_pid1();
    if Handoff::choose(as_pid1, config.supervise) == Handoff::Exec {
        if config.shutdown != ShutdownVia::Signal {
            log::info!("Init system receives SIGRTMIN+3 directly; --shutdown-via has no effect");
        }
        return Err(OrchestratorError::InitSpawn(InitProcess::exec(&config.init_argv)));
    }

    // Handlers go in before the child exists so no SIGCHLD is lost
    let signals = SignalHandler::new()
        .map_err(OrchestratorError::Signal)?
        .spawn_forwarder();

    let init = InitProcess::spawn(&config.init_argv).map_err(OrchestratorError::InitSpawn)?;

    let scope = if as_pid1 {
        ReapScope::All
    } else {
        ReapScope::Only(init.pid())
    };

    let adapter = init.shutdown_adapter(&config.shutdown, stop_signal());
    Ok(supervise(&init, &*adapter, signals, ZombieReaper::new(scope)).await)
}

/// Translate signals for `init` and reap until it exits
pub async fn supervise(
    init: &InitProcess,
    shutdown: &dyn InitSystem,
    mut signals: mpsc::Receiver<VmSignal>,
    reaper: ZombieReaper,
) -> i32 {
    let mut tick = tokio::time::interval(REAP_INTERVAL);
    let mut signals_open = true;
    let mut stopping = false;

    loop {
        tokio::select! {
            sig = signals.recv(), if signals_open => match sig {
                Some(VmSignal::Stop) => {
                    log::info!("Received stop signal, asking init system to shut down");
                    stopping = true;
                    if let Err(e) = shutdown.request_shutdown() {
                        log::error!("Shutdown request failed: {}", e);
                    }
                }
                Some(VmSignal::Term) => {
                    log::info!("Ignoring SIGTERM; stop requests arrive as SIGRTMIN+3");
                }
                Some(VmSignal::Int) => {
                    if let Err(e) = init.forward(libc::SIGINT) {
                        log::warn!("Failed to forward SIGINT to init: {}", e);
                    }
                }
                Some(VmSignal::Child) => {}
                None => {
                    log::warn!("Signal forwarder stopped");
                    signals_open = false;
                }
            },
            _ = tick.tick() => {}
        }

        for reaped in reaper.reap_all() {
            if reaped.pid != init.pid() {
                continue;
            }
            let code = reaped.status.exit_code();
            if stopping {
                log::info!("Init system shut down ({:?})", reaped.status);
            } else {
                log::error!("Init system exited unexpectedly ({:?})", reaped.status);
            }
            return code;
        }
    }
}
