//! Signal handling for the init entrypoint
//!
//! - SIGRTMIN+3: supervised stop request (the container's stop signal)
//! - SIGTERM: deliberately not a shutdown trigger here; logged and ignored
//! - SIGINT: passed on to the init system
//! - SIGCHLD: reap zombies

use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;

/// Signals the entrypoint handles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmSignal {
    /// Child process exited (SIGCHLD)
    Child,
    /// SIGTERM
    Term,
    /// Interrupt (SIGINT, Ctrl+C)
    Int,
    /// Realtime stop request (SIGRTMIN+3)
    Stop,
}

/// The realtime signal container runtimes send to stop a systemd container
pub fn stop_signal() -> libc::c_int {
    libc::SIGRTMIN() + 3
}

/// Signal handler for the entrypoint
pub struct SignalHandler {
    sigchld: Signal,
    sigterm: Signal,
    sigint: Signal,
    sigstop: Signal,
}

impl SignalHandler {
    /// Create a new signal handler
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            sigchld: signal(SignalKind::child())?,
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
            sigstop: signal(SignalKind::from_raw(stop_signal()))?,
        })
    }

    /// Wait for the next signal
    pub async fn wait(&mut self) -> VmSignal {
        tokio::select! {
            _ = self.sigchld.recv() => VmSignal::Child,
            _ = self.sigterm.recv() => VmSignal::Term,
            _ = self.sigint.recv() => VmSignal::Int,
            _ = self.sigstop.recv() => VmSignal::Stop,
        }
    }

    /// Spawn a task that forwards signals to a channel
    pub fn spawn_forwarder(mut self) -> mpsc::Receiver<VmSignal> {
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            loop {
                let sig = self.wait().await;
                if tx.send(sig).await.is_err() {
                    // Receiver dropped, exit
                    break;
                }
            }
        });

        rx
    }
}
