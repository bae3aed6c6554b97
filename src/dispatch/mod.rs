//! Connection dispatcher
//!
//! Accepts TCP connections and hands each one to its own worker process. Every
//! connection runs in an independent task with its own timers; nothing is
//! shared between them except the listening socket.

mod connection;

pub use connection::Connection;

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket};

use crate::spawn::{SpawnPolicy, WorkerCommand};

/// Default listen address for the PCSS service
pub const DEFAULT_LISTEN: &str = "0.0.0.0:1337";

const LISTEN_BACKLOG: u32 = 1024;
const ACCEPT_ERROR_PAUSE: Duration = Duration::from_millis(100);

/// Fixed worker command plus the timeouts it runs under
#[derive(Debug, Clone)]
pub struct Dispatcher {
    command: Arc<WorkerCommand>,
    policy: SpawnPolicy,
}

impl Dispatcher {
    pub fn new(command: WorkerCommand, policy: SpawnPolicy) -> Self {
        Self {
            command: Arc::new(command),
            policy,
        }
    }

    pub fn command(&self) -> &WorkerCommand {
        &self.command
    }

    pub fn policy(&self) -> SpawnPolicy {
        self.policy
    }

    /// Bind `addr` and serve forever
    pub async fn serve(&self, addr: SocketAddr) -> Result<(), DispatchError> {
        let listener = bind(addr)?;
        self.serve_until(listener, std::future::pending()).await;
        Ok(())
    }

    /// Accept connections on `listener` until `shutdown` resolves.
    ///
    /// In-flight connections keep running in their own tasks.
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        if let Ok(addr) = listener.local_addr() {
            log::info!("Listening on {} (worker: {})", addr, self.command);
        }

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("Stopping accept loop");
                    return;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        log::debug!("Accepted connection from {}", peer);
                        let conn = Connection::new(stream, peer);
                        let command = Arc::clone(&self.command);
                        let policy = self.policy;
                        tokio::spawn(async move {
                            conn.serve(&command, &policy).await;
                        });
                    }
                    Err(e) => {
                        log::error!("{}", DispatchError::Accept(e));
                        tokio::time::sleep(ACCEPT_ERROR_PAUSE).await;
                    }
                }
            }
        }
    }
}

/// Create a listening socket with SO_REUSEADDR set
pub fn bind(addr: SocketAddr) -> Result<TcpListener, DispatchError> {
    let bind_err = |source: io::Error| DispatchError::Bind { addr, source };

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(bind_err)?;

    socket.set_reuseaddr(true).map_err(bind_err)?;
    socket.bind(addr).map_err(bind_err)?;
    socket.listen(LISTEN_BACKLOG).map_err(bind_err)
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Failed to listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("accept error: {0}")]
    Accept(#[source] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_sets_reuseaddr() {
        let listener = bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        // Rebinding the same port right away must not fail with EADDRINUSE
        let again = bind(addr).unwrap();
        assert_eq!(again.local_addr().unwrap(), addr);
    }

    #[tokio::test]
    async fn test_bind_error_names_address() {
        let first = bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = first.local_addr().unwrap();

        // Port is still held by a listening socket
        match bind(addr) {
            Err(e @ DispatchError::Bind { .. }) => assert!(e.to_string().contains(&addr.to_string())),
            other => panic!("expected bind error, got {:?}", other.map(|l| l.local_addr())),
        }
    }
}
