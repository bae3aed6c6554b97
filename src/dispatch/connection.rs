//! A single accepted TCP session and its worker

use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use tokio::net::TcpStream;

use crate::spawn::{ExitOutcome, SpawnPolicy, WorkerCommand};

/// Live TCP session, owned by the task serving it
#[derive(Debug)]
pub struct Connection {
    pub peer: SocketAddr,
    pub accepted_at: DateTime<Utc>,
    stream: TcpStream,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            peer,
            accepted_at: Utc::now(),
            stream,
        }
    }

    /// Bind this connection to one worker and run it to completion.
    ///
    /// The socket is closed when this returns, whatever the outcome.
    pub async fn serve(self, command: &WorkerCommand, policy: &SpawnPolicy) -> ExitOutcome {
        let Connection {
            peer,
            accepted_at,
            stream,
        } = self;

        if let Err(e) = stream.set_nodelay(true) {
            log::debug!("{}: TCP_NODELAY failed: {}", peer, e);
        }

        let (read_half, write_half) = stream.into_split();
        let outcome = policy.run(command, read_half, write_half).await;

        let held = Utc::now().signed_duration_since(accepted_at);
        match &outcome {
            ExitOutcome::ExitedNormally(code) => {
                log::info!("{}: worker exited with {} ({} ms)", peer, code, held.num_milliseconds())
            }
            ExitOutcome::TimedOutGraceful(code) => {
                log::warn!("{}: worker timed out, stopped by SIGTERM (code {:?})", peer, code)
            }
            ExitOutcome::TimedOutKilled => {
                log::warn!("{}: worker timed out, killed", peer)
            }
            ExitOutcome::PeerClosed { killed } => {
                log::info!("{}: client went away, worker {}", peer, if *killed { "killed" } else { "terminated" })
            }
            ExitOutcome::SpawnFailed(e) => {
                log::error!("{}: could not start worker: {}", peer, e)
            }
        }

        outcome
    }
}
