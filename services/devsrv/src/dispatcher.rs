//! Command dispatch for one device session
//!
//! Maps each [`CommandKind`] onto its protocol exchange, applies the device
//! state changes of the response, and posts a `{code,msg}` result for
//! commands that carry an id. Transport failures are returned to the session
//! as [`LinkError`] after the failure result has been posted.

use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};

use crate::command::{Command, CommandKind, CommandResult};
use crate::error::{DevSrvError, Result};
use crate::link::{DeviceLink, Exchange, LinkError};
use crate::protocol::response::{HUMIDITY_FAULT, TEMPERATURE_FAULT};
use crate::protocol::{ClimateReading, DeviceStatus, HeaterState, PotionReading, Request};
use crate::queue::CommandQueue;
use crate::registry::SessionRegistry;
use crate::report::{handle_report, ReportOutcome};
use crate::store::{DeviceStore, DeviceUpdate, DOSAGE_EMPTY, DOSAGE_NO_CARTRIDGE};

/// Whether the session keeps running after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Terminate,
}

/// Response of one exchange as seen by a handler
enum Reply {
    Payload(Vec<u8>),
    /// A report arrived instead and has already been handled
    Interrupted,
}

pub struct Dispatcher<S> {
    link: DeviceLink<S>,
    store: Arc<dyn DeviceStore>,
    queue: Arc<dyn CommandQueue>,
    registry: SessionRegistry,
    session_id: u64,
    refresh_potion: bool,
    closed: bool,
}

impl<S> Dispatcher<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(
        link: DeviceLink<S>,
        store: Arc<dyn DeviceStore>,
        queue: Arc<dyn CommandQueue>,
        registry: SessionRegistry,
        session_id: u64,
    ) -> Self {
        Self {
            link,
            store,
            queue,
            registry,
            session_id,
            refresh_potion: false,
            closed: false,
        }
    }

    pub fn mac(&self) -> &str {
        self.link.mac()
    }

    pub fn link_mut(&mut self) -> &mut DeviceLink<S> {
        &mut self.link
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// True once a potion-replaced report is waiting for its level read
    pub fn refresh_pending(&self) -> bool {
        self.refresh_potion
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Parse one queue payload and run it
    ///
    /// A payload that fails validation never reaches the device; its id, if
    /// readable, gets a failure result.
    pub async fn handle_payload(&mut self, payload: &str) -> std::result::Result<Flow, LinkError> {
        match Command::from_json(payload) {
            Ok(command) => self.dispatch(command).await,
            Err(rejected) => {
                warn!("{} rejected command {}: {}", self.mac(), payload, rejected.error);
                let result = CommandResult::failure(rejected.error.to_string());
                self.post(rejected.id.as_deref(), &result).await;
                Ok(Flow::Continue)
            },
        }
    }

    /// Run one validated command
    pub async fn dispatch(&mut self, command: Command) -> std::result::Result<Flow, LinkError> {
        info!(
            "{} command {:?} id={}",
            self.mac(),
            command.kind,
            command.id.as_deref().unwrap_or("-")
        );

        let outcome = match command.kind {
            CommandKind::Delete => {
                if let Err(e) = self.delete(command.id.as_deref()).await {
                    warn!("{} delete: {}", self.mac(), e);
                }
                return Ok(Flow::Terminate);
            },
            CommandKind::Heartbeat => self.heartbeat().await,
            CommandKind::CheckStatus => self.heater(Request::status_check(), None).await,
            CommandKind::HeaterOn { duration } => {
                self.heater(Request::heater_on(duration), Some(i32::from(duration)))
                    .await
            },
            CommandKind::HeaterOff => self.heater(Request::heater_off(), Some(0)).await,
            CommandKind::ReadClimate => self.read_climate().await,
            CommandKind::ReadPotion => self.read_potion().await,
        };

        match outcome {
            Ok(result) => {
                if !result.is_success() {
                    warn!("{} {:?} failed: {}", self.mac(), command.kind, result.msg);
                }
                self.post(command.id.as_deref(), &result).await;
                Ok(Flow::Continue)
            },
            Err(e) => {
                self.post(command.id.as_deref(), &CommandResult::failure(e.to_string()))
                    .await;
                Err(e)
            },
        }
    }

    /// Welcome exchange for a newly registered device
    ///
    /// Returns whether the device answered; only transport failures are errors.
    pub async fn link_test(&mut self) -> std::result::Result<bool, LinkError> {
        match self.exchange(Request::link_test()).await? {
            Reply::Payload(_) => {
                info!("{} link test ok", self.mac());
                Ok(true)
            },
            Reply::Interrupted => Ok(false),
        }
    }

    /// Handle a frame received while idle
    pub async fn on_report(&mut self, bytes: &[u8]) -> std::result::Result<(), LinkError> {
        let outcome = handle_report(&mut self.link, self.store.as_ref(), bytes).await?;
        if outcome == ReportOutcome::RefreshPotion {
            self.refresh_potion = true;
        }
        Ok(())
    }

    /// Run the potion read requested by a replaced-cartridge report
    pub async fn run_pending(&mut self) -> std::result::Result<(), LinkError> {
        while self.refresh_potion {
            self.refresh_potion = false;
            let result = self.read_potion().await?;
            debug!("{} potion refresh: {}", self.mac(), result.msg);
        }
        Ok(())
    }

    /// Remove the device: record, registry entry and socket
    ///
    /// A second call on the same session does nothing but fail.
    pub async fn delete(&mut self, command_id: Option<&str>) -> Result<()> {
        let mac = self.mac().to_string();
        if self.closed {
            let err = DevSrvError::not_found(format!("session for {} already closed", mac));
            self.post(command_id, &CommandResult::failure(err.to_string()))
                .await;
            return Err(err);
        }

        match self.store.delete(&mac).await {
            Ok(true) => info!("{} deleted", mac),
            Ok(false) => warn!("{} had no device record", mac),
            Err(e) => error!("{} delete failed: {:#}", mac, e),
        }
        self.registry.unregister(&mac, self.session_id);
        self.close().await;
        self.post(command_id, &CommandResult::success("device deleted"))
            .await;
        Ok(())
    }

    /// Shut the socket down once
    pub async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.link.shutdown().await;
        }
    }

    // ========================================================================
    // Handlers
    // ========================================================================

    async fn heartbeat(&mut self) -> std::result::Result<CommandResult, LinkError> {
        match self.exchange(Request::heartbeat()).await? {
            Reply::Payload(_) => {
                self.update(DeviceUpdate::Online(true)).await;
                Ok(CommandResult::success("device online"))
            },
            Reply::Interrupted => Ok(interrupted()),
        }
    }

    /// Status check, heater on and heater off share one response layout
    ///
    /// `power` is what to store on success; `None` takes it from the response.
    async fn heater(
        &mut self,
        request: Request,
        power: Option<i32>,
    ) -> std::result::Result<CommandResult, LinkError> {
        let name = request.name();
        let payload = match self.exchange(request).await? {
            Reply::Payload(payload) => payload,
            Reply::Interrupted => return Ok(interrupted()),
        };
        let Some(state) = HeaterState::parse(&payload) else {
            return Ok(CommandResult::failure(format!("{}: short response", name)));
        };
        if state.status != DeviceStatus::Ok {
            return Ok(self.status_failure(state.status).await);
        }

        let power = power.unwrap_or_else(|| state.power());
        self.update(DeviceUpdate::Power(power)).await;
        Ok(CommandResult::success(format!("{}: power {}", name, power)))
    }

    async fn read_climate(&mut self) -> std::result::Result<CommandResult, LinkError> {
        let payload = match self.exchange(Request::read_climate()).await? {
            Reply::Payload(payload) => payload,
            Reply::Interrupted => return Ok(interrupted()),
        };
        let result = match ClimateReading::parse(&payload) {
            Some(ClimateReading::Ok {
                temperature,
                humidity,
            }) => {
                self.update(DeviceUpdate::Climate {
                    temperature,
                    humidity,
                })
                .await;
                CommandResult::success(format!(
                    "temperature {:.1}, humidity {:.1}",
                    temperature, humidity
                ))
            },
            Some(ClimateReading::SensorFault) => {
                self.update(DeviceUpdate::Climate {
                    temperature: TEMPERATURE_FAULT,
                    humidity: HUMIDITY_FAULT,
                })
                .await;
                CommandResult::failure("temperature/humidity sensor fault")
            },
            Some(ClimateReading::ChecksumError) => {
                CommandResult::failure(DeviceStatus::ChecksumError.describe())
            },
            Some(ClimateReading::Unknown(code)) => {
                CommandResult::failure(format!("unknown climate status {}", code))
            },
            None => CommandResult::failure("climate read: short response"),
        };
        Ok(result)
    }

    async fn read_potion(&mut self) -> std::result::Result<CommandResult, LinkError> {
        let payload = match self.exchange(Request::read_potion()).await? {
            Reply::Payload(payload) => payload,
            Reply::Interrupted => return Ok(interrupted()),
        };
        let result = match PotionReading::parse(&payload) {
            Some(PotionReading::Level(level)) => {
                self.update(DeviceUpdate::Dosage(level)).await;
                CommandResult::success(format!("potion remaining {:.2}", level))
            },
            Some(PotionReading::Status(status)) => self.status_failure(status).await,
            None => CommandResult::failure("potion read: short response"),
        };
        Ok(result)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn exchange(&mut self, request: Request) -> std::result::Result<Reply, LinkError> {
        match self.link.exchange(&request).await? {
            Exchange::Response(payload) => Ok(Reply::Payload(payload)),
            Exchange::Interrupted(bytes) => {
                warn!("{} {} interrupted by device report", self.mac(), request.name());
                self.on_report(&bytes).await?;
                Ok(Reply::Interrupted)
            },
        }
    }

    /// Cartridge states carry a dosage write; every non-ok status is a failure
    async fn status_failure(&self, status: DeviceStatus) -> CommandResult {
        match status {
            DeviceStatus::CartridgeRemoved => {
                self.update(DeviceUpdate::Dosage(DOSAGE_NO_CARTRIDGE)).await
            },
            DeviceStatus::CartridgeEmpty => self.update(DeviceUpdate::Dosage(DOSAGE_EMPTY)).await,
            _ => {},
        }
        CommandResult::failure(status.describe())
    }

    async fn update(&self, update: DeviceUpdate) {
        match self.store.apply(self.mac(), update).await {
            Ok(true) => {},
            Ok(false) => warn!("{} no device record for {:?}", self.mac(), update),
            Err(e) => error!("{} state update failed: {:#}", self.mac(), e),
        }
    }

    async fn post(&self, command_id: Option<&str>, result: &CommandResult) {
        let Some(id) = command_id else {
            return;
        };
        if let Err(e) = self.queue.post_result(id, result).await {
            error!("{} posting result for {} failed: {:#}", self.mac(), id, e);
        }
    }
}

fn interrupted() -> CommandResult {
    CommandResult::failure("interrupted by device report")
}
