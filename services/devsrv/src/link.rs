//! Framed I/O over one device socket
//!
//! [`DeviceLink`] owns the socket of an identified device and implements the
//! send-and-await exchange every command is built on: bounded receive
//! timeout, resend on timeout or bad checksum, and hand-back of any frame of
//! the wrong type so the caller can treat it as an unsolicited report.

use common::logging::FRAME_TARGET;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::protocol::frame::to_hex;
use crate::protocol::{FrameView, Request};

/// Largest single read from a device
pub const RECV_BUFFER_SIZE: usize = 4096;

/// Terminal transport failures; any of these ends the session
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    #[error("receive failed: {0}")]
    RecvFailed(#[source] std::io::Error),

    /// Peer closed the connection (zero-length read)
    #[error("connection closed by device")]
    Closed,

    #[error("no response after {attempts} attempts")]
    NoResponse { attempts: u32 },
}

/// Outcome of a successful [`DeviceLink::exchange`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exchange {
    /// Payload of the awaited response (empty for fire-and-forget requests)
    Response(Vec<u8>),
    /// The device sent a frame of another type instead; raw bytes attached
    Interrupted(Vec<u8>),
}

/// Timing knobs for one link
#[derive(Debug, Clone, Copy)]
pub struct LinkSettings {
    pub recv_timeout: Duration,
    pub max_attempts: u32,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            recv_timeout: Duration::from_secs(5),
            max_attempts: 5,
        }
    }
}

pub struct DeviceLink<S> {
    mac: String,
    stream: S,
    settings: LinkSettings,
    buf: Vec<u8>,
}

impl<S> DeviceLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(mac: impl Into<String>, stream: S, settings: LinkSettings) -> Self {
        Self {
            mac: mac.into(),
            stream,
            settings,
            buf: vec![0u8; RECV_BUFFER_SIZE],
        }
    }

    pub fn mac(&self) -> &str {
        &self.mac
    }

    pub fn settings(&self) -> LinkSettings {
        self.settings
    }

    /// Write one encoded request
    pub async fn send(&mut self, request: &Request) -> Result<(), LinkError> {
        debug!(
            target: FRAME_TARGET,
            "{} TX {} {}",
            self.mac,
            request.name(),
            to_hex(request.frame())
        );
        self.stream
            .write_all(request.frame())
            .await
            .map_err(LinkError::SendFailed)?;
        self.stream.flush().await.map_err(LinkError::SendFailed)
    }

    /// One bounded read; `Ok(None)` when the timeout elapses first
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, LinkError> {
        let read = tokio::time::timeout(self.settings.recv_timeout, self.stream.read(&mut self.buf));
        match read.await {
            Err(_) => Ok(None),
            Ok(Err(e)) => Err(LinkError::RecvFailed(e)),
            Ok(Ok(0)) => Err(LinkError::Closed),
            Ok(Ok(n)) => {
                let bytes = self.buf[..n].to_vec();
                debug!(target: FRAME_TARGET, "{} RX {}", self.mac, to_hex(&bytes));
                Ok(Some(bytes))
            },
        }
    }

    /// Send `request` and wait for its response, resending up to `max_attempts` times
    ///
    /// A timeout or a response that fails its checksum costs one attempt. A
    /// frame carrying a different type byte ends the call immediately with
    /// [`Exchange::Interrupted`]; the request is not resent.
    pub async fn exchange(&mut self, request: &Request) -> Result<Exchange, LinkError> {
        let attempts = self.settings.max_attempts;
        for attempt in 1..=attempts {
            self.send(request).await?;

            let Some(expect) = request.expect() else {
                return Ok(Exchange::Response(Vec::new()));
            };

            let Some(bytes) = self.recv().await? else {
                warn!(
                    "{} {} timed out (attempt {}/{})",
                    self.mac,
                    request.name(),
                    attempt,
                    attempts
                );
                continue;
            };

            let received_type = FrameView::new(&bytes).frame_type();
            if let Some(t) = received_type.filter(|t| *t != expect.frame_type) {
                debug!(
                    "{} expected type {:#04x}, got {:#04x}; treating as report",
                    self.mac, expect.frame_type, t
                );
                return Ok(Exchange::Interrupted(bytes));
            }

            let view = FrameView::new(&bytes);
            match view.payload(expect.len) {
                Some(payload) if view.is_valid(expect.len) => {
                    return Ok(Exchange::Response(payload.to_vec()));
                },
                _ => warn!(
                    "{} {} bad response {} (attempt {}/{})",
                    self.mac,
                    request.name(),
                    to_hex(&bytes),
                    attempt,
                    attempts
                ),
            }
        }
        Err(LinkError::NoResponse { attempts })
    }

    /// Close the write half; errors are irrelevant at this point
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("{} socket shutdown: {}", self.mac, e);
        }
    }
}
