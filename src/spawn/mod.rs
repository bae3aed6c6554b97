//! Process spawn policy
//!
//! Runs one worker process per call, wired to a pair of byte streams, under a
//! two-stage deadline:
//! 1. After the soft timeout, SIGTERM goes to the worker's process group
//! 2. After the grace timeout, SIGKILL goes to whatever is left
//!
//! Both countdowns are plain timers raced against the child's exit, so they are
//! dropped the moment the worker is reaped. The pid is only signalled while the
//! `Child` handle is still unreaped; once it is, anything left in its group is
//! SIGKILLed before `run` returns.

mod command;
mod outcome;

pub use command::WorkerCommand;
pub use outcome::{exit_code, ExitOutcome, WorkerProcess, WorkerStatus};

use std::io;
use std::process::Stdio;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Default budget before SIGTERM
pub const DEFAULT_SOFT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default budget between SIGTERM and SIGKILL
pub const DEFAULT_GRACE_TIMEOUT: Duration = Duration::from_secs(5);

const PUMP_BUFFER: usize = 8 * 1024;

/// Timeouts applied to every worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnPolicy {
    pub soft_timeout: Duration,
    pub grace_timeout: Duration,
}

impl Default for SpawnPolicy {
    fn default() -> Self {
        Self {
            soft_timeout: DEFAULT_SOFT_TIMEOUT,
            grace_timeout: DEFAULT_GRACE_TIMEOUT,
        }
    }
}

/// What made the policy stop waiting for a natural exit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    SoftTimeout,
    /// Writing to the peer failed
    PeerClosed,
    /// Peer finished sending and the worker outlived the grace period
    HangupExpired,
}

/// How the inbound pump finished
#[derive(Debug)]
enum InboundEnd {
    /// Peer sent EOF or the read failed
    Hangup,
    /// Worker closed its stdin; the peer may still be there
    WorkerClosed,
}

impl SpawnPolicy {
    pub fn new(soft_timeout: Duration, grace_timeout: Duration) -> Self {
        Self {
            soft_timeout,
            grace_timeout,
        }
    }

    /// Run `command` with `input` as its stdin and `output` as its stdout.
    ///
    /// Returns once the worker has been reaped and its process group is gone.
    /// EOF on `input` closes the worker's stdin and leaves it at most the grace
    /// timeout to answer. `output` is shut down after the worker's remaining
    /// stdout has been written, within the same grace budget.
    pub async fn run<R, W>(&self, command: &WorkerCommand, input: R, output: W) -> ExitOutcome
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut child = match spawn_worker(command) {
            Ok(child) => child,
            Err(e) => {
                log::error!("Failed to spawn {}: {}", command, e);
                return ExitOutcome::SpawnFailed(e);
            }
        };

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill().await;
                return ExitOutcome::SpawnFailed(SpawnError::MissingPipe);
            }
        };

        let pid = child.id().unwrap_or_default();
        let mut worker =
            WorkerProcess::new(pid, command.clone(), self.soft_timeout, self.grace_timeout);
        log::debug!("Worker {} started: {}", pid, command);

        let mut inbound: JoinHandle<InboundEnd> = tokio::spawn(pump_in(input, stdin));
        let mut outbound: JoinHandle<io::Result<()>> = tokio::spawn(pump_out(stdout, output));
        let mut inbound_done = false;
        let mut outbound_done = false;

        let started = Instant::now();
        let soft = tokio::time::sleep_until(started + self.soft_timeout);
        tokio::pin!(soft);
        // Armed when the peer stops sending
        let hangup = tokio::time::sleep_until(started);
        tokio::pin!(hangup);
        let mut hangup_armed = false;

        let trigger = loop {
            tokio::select! {
                status = child.wait() => {
                    inbound.abort();
                    worker.set_exited();
                    let code = match status {
                        Ok(status) => exit_code(status),
                        Err(e) => {
                            log::warn!("Worker {}: wait failed: {}", pid, e);
                            -1
                        }
                    };
                    log::debug!("Worker {} exited with {} after {:?}", pid, code, worker.elapsed());
                    kill_leftovers(pid);

                    let mut flush_by = Instant::now() + self.grace_timeout;
                    flush_by = flush_by.min(started + self.soft_timeout + self.grace_timeout);
                    if hangup_armed {
                        flush_by = flush_by.min(hangup.deadline());
                    }
                    self.drain(&mut outbound, outbound_done, flush_by).await;
                    return ExitOutcome::ExitedNormally(code);
                }
                _ = &mut soft => break Trigger::SoftTimeout,
                _ = &mut hangup, if hangup_armed => break Trigger::HangupExpired,
                end = &mut inbound, if !inbound_done => {
                    inbound_done = true;
                    if let Ok(InboundEnd::WorkerClosed) = end {
                        continue;
                    }
                    // Stdin was dropped with the pump; the worker sees EOF
                    log::debug!(
                        "Peer of worker {} finished sending, {:?} left to answer",
                        pid,
                        self.grace_timeout
                    );
                    hangup.as_mut().reset(Instant::now() + self.grace_timeout);
                    hangup_armed = true;
                }
                res = &mut outbound, if !outbound_done => {
                    outbound_done = true;
                    match res {
                        // Worker closed stdout but keeps running
                        Ok(Ok(())) => continue,
                        _ => break Trigger::PeerClosed,
                    }
                }
            }
        };

        let mut stop_by = Instant::now() + self.grace_timeout;
        if hangup_armed {
            stop_by = stop_by.min(hangup.deadline());
        }

        let exited = match trigger {
            Trigger::HangupExpired => {
                log::info!("Worker {} did not finish after its peer hung up", pid);
                None
            }
            Trigger::SoftTimeout | Trigger::PeerClosed => {
                if trigger == Trigger::SoftTimeout {
                    log::warn!(
                        "Worker {} still running after {:?}, sending SIGTERM",
                        pid,
                        self.soft_timeout
                    );
                } else {
                    log::info!("Connection for worker {} closed, sending SIGTERM", pid);
                }
                worker.set_stopping();
                signal_group(&mut child, Signal::SIGTERM);
                tokio::time::timeout_at(stop_by, child.wait()).await.ok()
            }
        };

        let outcome = match exited {
            Some(status) => {
                worker.set_exited();
                let code = status.ok().and_then(|s| s.code());
                match trigger {
                    Trigger::SoftTimeout => ExitOutcome::TimedOutGraceful(code),
                    _ => ExitOutcome::PeerClosed { killed: false },
                }
            }
            None => {
                log::warn!("Worker {} out of grace time, sending SIGKILL", pid);
                worker.set_killed();
                signal_group(&mut child, Signal::SIGKILL);
                if let Err(e) = child.wait().await {
                    log::error!("Worker {}: wait after SIGKILL failed: {}", pid, e);
                }
                match trigger {
                    Trigger::SoftTimeout => ExitOutcome::TimedOutKilled,
                    _ => ExitOutcome::PeerClosed { killed: true },
                }
            }
        };

        inbound.abort();
        kill_leftovers(pid);
        self.drain(&mut outbound, outbound_done, stop_by).await;
        outcome
    }

    /// Let the outbound pump write what the worker left in the pipe
    async fn drain(&self, outbound: &mut JoinHandle<io::Result<()>>, done: bool, by: Instant) {
        if done {
            return;
        }
        match tokio::time::timeout_at(by, &mut *outbound).await {
            Ok(Ok(Err(e))) => log::debug!("Output flush failed: {}", e),
            Ok(_) => {}
            Err(_) => {
                log::debug!("Output still open at the grace deadline, dropping it");
                outbound.abort();
            }
        }
    }
}

/// Create the worker process in its own process group
fn spawn_worker(command: &WorkerCommand) -> Result<Child, SpawnError> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    // A fresh group lets one signal reach helpers the interpreter forks
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))?;
            Ok(())
        });
    }

    cmd.spawn().map_err(SpawnError::Spawn)
}

/// SIGKILL whatever is left in a reaped worker's process group
///
/// Members keep the group id from being reused while any of them is alive.
fn kill_leftovers(pgid: u32) {
    if pgid == 0 {
        return;
    }
    match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
        Ok(()) => log::debug!("Killed leftover processes in group {}", pgid),
        Err(Errno::ESRCH) => {}
        Err(e) => log::warn!("killpg({}, SIGKILL) failed: {}", pgid, e),
    }
}

/// Signal the worker's process group, falling back to the worker alone
fn signal_group(child: &mut Child, signal: Signal) {
    // None once reaped; the pid may already belong to someone else
    let Some(pid) = child.id() else {
        return;
    };

    if let Err(e) = killpg(Pid::from_raw(pid as i32), signal) {
        log::debug!("killpg({}, {}) failed: {}, signalling pid only", pid, signal, e);
        if signal == Signal::SIGKILL {
            let _ = child.start_kill();
        } else {
            let _ = nix::sys::signal::kill(Pid::from_raw(pid as i32), signal);
        }
    }
}

async fn pump_in<R>(mut input: R, mut stdin: ChildStdin) -> InboundEnd
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; PUMP_BUFFER];
    loop {
        let n = match input.read(&mut buf).await {
            Ok(0) => return InboundEnd::Hangup,
            Ok(n) => n,
            Err(e) => {
                log::debug!("Read from peer failed: {}", e);
                return InboundEnd::Hangup;
            }
        };
        let Some(chunk) = buf.get(..n) else {
            return InboundEnd::Hangup;
        };
        if stdin.write_all(chunk).await.is_err() {
            return InboundEnd::WorkerClosed;
        }
    }
}

async fn pump_out<W>(mut stdout: ChildStdout, mut output: W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    tokio::io::copy(&mut stdout, &mut output).await?;
    output.shutdown().await
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("Empty worker command")]
    EmptyCommand,

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Failed to spawn process: {0}")]
    Spawn(#[source] io::Error),

    #[error("Worker stdio pipes were not created")]
    MissingPipe,
}
