//! vm-init - entrypoint for the PCSS VM container
//!
//! `vm-init prebuild` runs once while the image is built: it enables the
//! image's services, masks units that have no place in a container and exits.
//!
//! `vm-init` with no mode hands over to the init system. As PID 1 it execs
//! systemd, which turns SIGRTMIN+3 (the container stop signal) into an orderly
//! halt itself. Otherwise, or with `--supervise`, it starts the init system as
//! a child, translates SIGRTMIN+3 for it and exits with its status.

use std::path::PathBuf;

use clap::Parser;
use log::info;

use pcss_vm::manager::Manager;
use pcss_vm::orchestrator::{self, OrchestratorError, RuntimeConfig, ServicePhase, DEFAULT_INIT};
use pcss_vm::pid1::ShutdownVia;
use pcss_vm::units::declared::PLAN;

#[derive(Parser)]
#[command(name = "vm-init")]
#[command(about = "Entrypoint for the PCSS VM container")]
struct Args {
    /// Phase to run: `prebuild`, or nothing for normal startup
    mode: Option<String>,

    /// Root directory holding the unit files and config to edit
    #[arg(long, env = "VM_INIT_ROOT", default_value = "/")]
    root: PathBuf,

    /// Init system command line (split with shell quoting rules)
    #[arg(long = "init", env = "VM_INIT_COMMAND", default_value = DEFAULT_INIT)]
    init_command: String,

    /// How to ask the init system to stop: `signal` or `systemctl`
    #[arg(long, env = "VM_INIT_SHUTDOWN", default_value = "signal")]
    shutdown_via: ShutdownVia,

    /// Keep vm-init in front of the init system even as PID 1 (not for systemd)
    #[arg(long, env = "VM_INIT_SUPERVISE")]
    supervise: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let code = match run(args).await {
        Ok(code) => code,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("vm-init: {}", e);
            1
        }
    };

    std::process::exit(code);
}

async fn run(args: Args) -> Result<i32, OrchestratorError> {
    match ServicePhase::from_arg(args.mode.as_deref())? {
        ServicePhase::Prebuild => {
            info!("Running prebuild in {}", args.root.display());
            let manager = Manager::with_root(&args.root);
            let report = orchestrator::prebuild(&manager, &PLAN).await?;
            if report.is_noop() {
                println!("No unit changes");
            } else {
                for change in &report.changes {
                    println!("{}", change);
                }
            }
            Ok(0)
        }
        ServicePhase::Runtime => {
            let init_argv = shlex::split(&args.init_command)
                .filter(|argv| !argv.is_empty())
                .ok_or_else(|| {
                    OrchestratorError::InitSpawn(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("invalid init command: {}", args.init_command),
                    ))
                })?;

            let config = RuntimeConfig {
                root: args.root,
                init_argv,
                shutdown: args.shutdown_via,
                supervise: args.supervise,
            };
            info!("Starting init system: {}", args.init_command);
            orchestrator::run_runtime(&config).await
        }
    }
}
