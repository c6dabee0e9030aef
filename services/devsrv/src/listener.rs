//! TCP accept loop
//!
//! One task per connection. Admission is bounded only by the listen backlog
//! and a session cap enforced with a semaphore.

use errors::{ServiceError, ServiceResult};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::session::{Session, SessionContext};

/// Pause after a failed accept (e.g. file descriptor exhaustion)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct DeviceServer {
    listener: TcpListener,
    sessions: Arc<Semaphore>,
    max_sessions: usize,
}

impl DeviceServer {
    /// Bind and listen without accepting yet
    pub fn bind(config: &ServerConfig) -> ServiceResult<Self> {
        let bind_failed = |reason: String| ServiceError::BindFailed {
            address: config.bind.clone(),
            reason,
        };

        let addr: SocketAddr = config
            .bind
            .parse()
            .map_err(|e| bind_failed(format!("invalid address: {}", e)))?;
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(|e| bind_failed(e.to_string()))?;
        socket
            .set_reuseaddr(true)
            .map_err(|e| bind_failed(e.to_string()))?;
        socket.bind(addr).map_err(|e| bind_failed(e.to_string()))?;
        let listener = socket
            .listen(config.backlog)
            .map_err(|e| bind_failed(e.to_string()))?;

        Ok(Self {
            listener,
            sessions: Arc::new(Semaphore::new(config.max_sessions)),
            max_sessions: config.max_sessions,
        })
    }

    pub fn local_addr(&self) -> ServiceResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Sessions currently running
    pub fn active_sessions(&self) -> usize {
        self.max_sessions - self.sessions.available_permits()
    }

    /// Accept until `shutdown` fires; each session gets a child of `shutdown`
    pub async fn serve(self, ctx: SessionContext, shutdown: CancellationToken) -> ServiceResult<()> {
        info!(
            "Device server listening on {} (max {} sessions)",
            self.local_addr()?,
            self.max_sessions
        );

        loop {
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = Arc::clone(&self.sessions).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        drop(permit);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    },
                },
            };

            if let Err(e) = stream.set_nodelay(true) {
                warn!("{} set_nodelay: {}", peer, e);
            }
            debug!("Accepted connection from {}", peer);

            let session = Session::new(stream, peer, ctx.clone(), shutdown.clone());
            tokio::spawn(async move {
                let end = session.run().await;
                debug!("{} closed: {:?}", peer, end);
                drop(permit);
            });
        }

        info!("Device server stopped");
        Ok(())
    }
}
