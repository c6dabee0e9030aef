//! Test Common Utilities
//!
//! A simulated device on one end of an in-memory duplex pipe, and a session
//! context backed by the in-memory store and queue.

#![allow(dead_code)]
#![allow(clippy::disallowed_methods)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use devsrv::link::LinkSettings;
use devsrv::protocol::frame::{encode, frame_type};
use devsrv::protocol::Request;
use devsrv::queue::{CommandQueue, MemoryCommandQueue};
use devsrv::registry::SessionRegistry;
use devsrv::session::{Session, SessionContext, SessionEnd, SessionSettings};
use devsrv::store::{DeviceStore, MemoryDeviceStore, NewDevice};

pub const MAC: &str = "0123456789AB";

/// Shared backends for one test
pub struct TestGateway {
    pub store: MemoryDeviceStore,
    pub queue: MemoryCommandQueue,
    pub registry: SessionRegistry,
    pub shutdown: CancellationToken,
    pub settings: SessionSettings,
}

impl TestGateway {
    pub fn new() -> Self {
        Self {
            store: MemoryDeviceStore::new(),
            queue: MemoryCommandQueue::new(),
            registry: SessionRegistry::new(),
            shutdown: CancellationToken::new(),
            settings: SessionSettings {
                handshake_timeout: Duration::from_secs(5),
                link: LinkSettings {
                    recv_timeout: Duration::from_secs(5),
                    max_attempts: 5,
                },
            },
        }
    }

    pub fn context(&self) -> SessionContext {
        SessionContext::new(
            Arc::new(self.store.clone()),
            Arc::new(self.queue.clone()),
            self.registry.clone(),
            self.settings,
        )
    }

    /// Pre-create a record so the session takes the known-device path
    pub async fn known_device(&self, mac: &str) {
        self.store
            .insert(NewDevice::new(mac, "10.0.0.9"))
            .await
            .unwrap();
    }

    /// Open a connection and send `hello` as the handshake
    pub async fn connect(&self, hello: &[u8]) -> (SimDevice, JoinHandle<SessionEnd>) {
        let (server, mut device) = duplex(4096);
        device.write_all(hello).await.unwrap();
        let peer: SocketAddr = "10.0.0.9:51000".parse().unwrap();
        let session = Session::new(server, peer, self.context(), self.shutdown.clone());
        (SimDevice { stream: device }, tokio::spawn(session.run()))
    }

    pub async fn push(&self, mac: &str, payload: &str) {
        self.queue.push(mac, payload).await.unwrap();
    }

    /// Poll until `mac` has a registered session
    pub async fn wait_registered(&self, mac: &str) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.registry.lookup(mac).is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    /// Poll until a result for `command_id` is posted
    pub async fn wait_result(&self, command_id: &str) -> devsrv::command::CommandResult {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(result) = self.queue.results(command_id).into_iter().next() {
                    return result;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap()
    }
}

/// Poll `condition` every few milliseconds until it holds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

/// Device side of a connection
pub struct SimDevice {
    pub stream: DuplexStream,
}

impl SimDevice {
    pub async fn read(&mut self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.stream.read_exact(&mut buf).await.unwrap();
        buf
    }

    /// Read the next frame and check it is exactly `request`
    pub async fn expect(&mut self, request: &Request) {
        let frame = self.read(request.frame().len()).await;
        assert_eq!(
            &frame[..],
            &request.frame()[..],
            "expected {}",
            request.name()
        );
    }

    pub async fn respond(&mut self, frame_type: u8, payload: &[u8]) {
        self.stream
            .write_all(&encode(frame_type, payload))
            .await
            .unwrap();
    }

    pub async fn report(&mut self, subtype: u8, data: u8) {
        self.respond(frame_type::REPORT, &[subtype, data]).await;
    }

    /// Everything the server writes until it closes the socket
    pub async fn drain(&mut self) -> Vec<u8> {
        let mut rest = Vec::new();
        self.stream.read_to_end(&mut rest).await.unwrap();
        rest
    }
}
