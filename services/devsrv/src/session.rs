//! One device connection from handshake to teardown
//!
//! Handshaking: read the identifier, reject anything malformed.
//! Active: register, bring the device record online, then alternate between
//! the command queue and the socket. The queue is always checked first.
//! Terminated: mark offline on transport failure (unless a newer session
//! owns the identifier), drop the registry entry, close the socket.
//!
//! Both online-flag decisions run under the device's online lock, so a
//! session going down cannot overwrite the flag its successor just set.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::dispatcher::{Dispatcher, Flow};
use crate::error::{DevSrvError, Result};
use crate::link::{DeviceLink, LinkError, LinkSettings};
use crate::protocol::DeviceId;
use crate::queue::CommandQueue;
use crate::registry::{SessionHandle, SessionRegistry};
use crate::store::{DeviceStore, DeviceUpdate, NewDevice};

/// Largest handshake message read
const HANDSHAKE_BUFFER_SIZE: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub handshake_timeout: Duration,
    pub link: LinkSettings,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            link: LinkSettings::default(),
        }
    }
}

/// Everything a session shares with the rest of the process
#[derive(Clone)]
pub struct SessionContext {
    pub store: Arc<dyn DeviceStore>,
    pub queue: Arc<dyn CommandQueue>,
    pub registry: SessionRegistry,
    pub settings: SessionSettings,
}

impl SessionContext {
    pub fn new(
        store: Arc<dyn DeviceStore>,
        queue: Arc<dyn CommandQueue>,
        registry: SessionRegistry,
        settings: SessionSettings,
    ) -> Self {
        Self {
            store,
            queue,
            registry,
            settings,
        }
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Handshake failed; nothing was registered or stored
    Rejected,
    /// Delete command processed
    Deleted,
    /// Device record went offline or disappeared
    Offline,
    /// Transport failure; device marked offline
    LinkLost,
    /// Same identifier connected again
    Replaced,
    /// Process shutdown
    Shutdown,
}

pub struct Session<S> {
    stream: S,
    peer: SocketAddr,
    ctx: SessionContext,
    shutdown: CancellationToken,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, peer: SocketAddr, ctx: SessionContext, shutdown: CancellationToken) -> Self {
        Self {
            stream,
            peer,
            ctx,
            shutdown,
        }
    }

    pub async fn run(mut self) -> SessionEnd {
        let device_id = match self.handshake().await {
            Ok(id) => id,
            Err(e) => {
                warn!("{} handshake rejected: {}", self.peer, e);
                if let Err(e) = self.stream.shutdown().await {
                    warn!("{} socket shutdown: {}", self.peer, e);
                }
                return SessionEnd::Rejected;
            },
        };
        let mac = device_id.as_str().to_string();

        let token = self.shutdown.child_token();
        let handle = self.ctx.registry.register(&mac, token.clone());
        info!("{} connected from {} (session #{})", mac, self.peer, handle.id());

        let link = DeviceLink::new(mac.clone(), self.stream, self.ctx.settings.link);
        let mut dispatcher = Dispatcher::new(
            link,
            Arc::clone(&self.ctx.store),
            Arc::clone(&self.ctx.queue),
            self.ctx.registry.clone(),
            handle.id(),
        );

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            outcome = drive(&mut dispatcher, &self.ctx, &handle, &mac, self.peer) => Some(outcome),
        };

        let end = match outcome {
            None if self.shutdown.is_cancelled() => SessionEnd::Shutdown,
            None => SessionEnd::Replaced,
            Some(Ok(end)) => end,
            Some(Err(e)) => {
                error!("{} connection lost: {}", mac, e);
                let _online = handle.lock_online().await;
                let current = self
                    .ctx
                    .registry
                    .lookup(&mac)
                    .is_some_and(|h| h.id() == handle.id());
                if current {
                    mark_offline(self.ctx.store.as_ref(), &mac).await;
                } else {
                    info!("{} superseded, leaving online flag", mac);
                }
                SessionEnd::LinkLost
            },
        };

        self.ctx.registry.unregister(&mac, handle.id());
        dispatcher.close().await;
        info!("{} session #{} ended: {:?}", mac, handle.id(), end);
        end
    }

    async fn handshake(&mut self) -> Result<DeviceId> {
        let mut buf = [0u8; HANDSHAKE_BUFFER_SIZE];
        let read = tokio::time::timeout(
            self.ctx.settings.handshake_timeout,
            self.stream.read(&mut buf),
        )
        .await;
        match read {
            Err(_) => Err(DevSrvError::handshake("no identifier before timeout")),
            Ok(Err(e)) => Err(DevSrvError::handshake(format!("read failed: {}", e))),
            Ok(Ok(0)) => Err(DevSrvError::handshake("connection closed")),
            Ok(Ok(n)) => DeviceId::parse(&buf[..n]),
        }
    }
}

/// Bring the device online, then serve it until something ends the session
async fn drive<S>(
    dispatcher: &mut Dispatcher<S>,
    ctx: &SessionContext,
    handle: &SessionHandle,
    mac: &str,
    peer: SocketAddr,
) -> std::result::Result<SessionEnd, LinkError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    if bring_online(ctx, handle, mac, peer).await {
        dispatcher.link_test().await?;
    }

    loop {
        dispatcher.run_pending().await?;

        match ctx.queue.pop(mac).await {
            Ok(Some(payload)) => {
                if dispatcher.handle_payload(&payload).await? == Flow::Terminate {
                    return Ok(SessionEnd::Deleted);
                }
                continue;
            },
            Ok(None) => {},
            Err(e) => warn!("{} queue poll failed: {:#}", mac, e),
        }

        match ctx.store.find(mac).await {
            Ok(Some(record)) if record.online => {},
            Ok(Some(_)) => {
                info!("{} is offline", mac);
                return Ok(SessionEnd::Offline);
            },
            Ok(None) => {
                info!("{} record removed", mac);
                return Ok(SessionEnd::Offline);
            },
            Err(e) => warn!("{} online check failed: {:#}", mac, e),
        }

        tokio::select! {
            biased;
            _ = ctx.queue.wait_for_command(mac) => {},
            received = dispatcher.link_mut().recv() => {
                if let Some(bytes) = received? {
                    dispatcher.on_report(&bytes).await?;
                }
            },
        }
    }
}

/// Create or revive the device record; true when it was newly created
async fn bring_online(
    ctx: &SessionContext,
    handle: &SessionHandle,
    mac: &str,
    peer: SocketAddr,
) -> bool {
    let _online = handle.lock_online().await;
    match ctx.store.find(mac).await {
        Ok(Some(_)) => {
            info!("{} known device", mac);
            set_online(ctx.store.as_ref(), mac).await;
            false
        },
        Ok(None) => {
            info!("{} new device", mac);
            if let Err(e) = ctx
                .store
                .insert(NewDevice::new(mac, peer.ip().to_string()))
                .await
            {
                error!("{} failed to create device record: {:#}", mac, e);
            }
            true
        },
        Err(e) => {
            error!("{} device lookup failed: {:#}", mac, e);
            set_online(ctx.store.as_ref(), mac).await;
            false
        },
    }
}

async fn set_online(store: &dyn DeviceStore, mac: &str) {
    if let Err(e) = store.apply(mac, DeviceUpdate::Online(true)).await {
        error!("{} failed to mark online: {:#}", mac, e);
    }
}

async fn mark_offline(store: &dyn DeviceStore, mac: &str) {
    if let Err(e) = store.apply(mac, DeviceUpdate::Online(false)).await {
        error!("{} failed to mark offline: {:#}", mac, e);
    }
}
