//! pcss-vm - entrypoint and service plumbing for the PCSS VM image
//!
//! Two programs are built from this crate:
//! - `vm-init`: the container's first process. `vm-init prebuild` enables and
//!   masks the image's units once at build time; plain `vm-init` runs the init
//!   system and turns SIGRTMIN+3 into an orderly shutdown.
//! - `pcssd`: the PCSS service. Accepts TCP connections and runs one worker
//!   process per connection under a soft/hard timeout.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐   ┌────────────────────────────┐
//! │          vm-init             │   │           pcssd            │
//! ├──────────────────────────────┤   ├────────────────────────────┤
//! │ orchestrator │ pid1          │   │ dispatch (accept loop)     │
//! ├──────────────┴───────────────┤   ├────────────────────────────┤
//! │ manager (enable/mask) │ units│   │ spawn (timeout policy)     │
//! └──────────────────────────────┘   └────────────────────────────┘
//! ```

pub mod dispatch;
pub mod manager;
pub mod orchestrator;
pub mod pid1;
pub mod spawn;
pub mod units;

pub use dispatch::Dispatcher;
pub use orchestrator::ServicePhase;
pub use spawn::{ExitOutcome, SpawnPolicy, WorkerCommand};
