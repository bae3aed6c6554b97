//! pcssd - PCSS connection dispatcher
//!
//! Listens on a TCP port and runs one worker process per connection, wired to
//! the socket through its stdin/stdout. Workers get `--timeout` seconds before
//! SIGTERM and `--grace` more before SIGKILL.
//!
//! The worker command is given as trailing arguments, or in PCSS_WORKER:
//!
//! ```text
//! pcssd --listen 0.0.0.0:1337 -- python3 -u /opt/pcss/worker.py
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use log::info;
use tokio::signal::unix::{signal, SignalKind};

use pcss_vm::dispatch::{self, Dispatcher, DEFAULT_LISTEN};
use pcss_vm::spawn::{SpawnPolicy, WorkerCommand};

#[derive(Parser)]
#[command(name = "pcssd")]
#[command(about = "Run one worker process per TCP connection")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "PCSS_LISTEN", default_value = DEFAULT_LISTEN)]
    listen: SocketAddr,

    /// Seconds a worker may run before SIGTERM
    #[arg(long, env = "PCSS_TIMEOUT", default_value_t = 30)]
    timeout: u64,

    /// Seconds between SIGTERM and SIGKILL
    #[arg(long, env = "PCSS_GRACE", default_value_t = 5)]
    grace: u64,

    /// Worker command line, used when no trailing command is given
    #[arg(long, env = "PCSS_WORKER", hide_env_values = true)]
    worker: Option<WorkerCommand>,

    /// Worker program and arguments
    #[arg(last = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let command = if args.command.is_empty() {
        args.worker.ok_or("no worker command (pass it after `--` or set PCSS_WORKER)")?
    } else {
        WorkerCommand::from_argv(args.command)?
    };

    if args.timeout == 0 || args.grace == 0 {
        return Err("--timeout and --grace must be positive".into());
    }

    let policy = SpawnPolicy::new(Duration::from_secs(args.timeout), Duration::from_secs(args.grace));
    info!(
        "Worker budget: {:?} soft, {:?} grace",
        policy.soft_timeout, policy.grace_timeout
    );

    let listener = dispatch::bind(args.listen)?;
    let dispatcher = Dispatcher::new(command, policy);

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let shutdown = async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
    };

    dispatcher.serve_until(listener, shutdown).await;
    Ok(())
}
