//! Periodic status polling and scheduled heater switch-on
//!
//! Every interval each online device gets a heartbeat, climate read, status
//! check and potion read queued as background commands (no id, so no result
//! is posted). Devices in scheduled mode whose start time is within a minute
//! of now also get a heater-on with their last manual duration.

use chrono::{Local, NaiveTime, Timelike};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::command::{Command, CommandKind};
use crate::protocol::HEATER_DURATION_RANGE;
use crate::queue::CommandQueue;
use crate::store::{DeviceRecord, DeviceStore};

/// How close to the schedule start a tick must fall, in seconds
pub const SCHEDULE_WINDOW_SECS: i64 = 60;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Background commands queued for every online device, in order
pub const POLL_COMMANDS: [CommandKind; 4] = [
    CommandKind::Heartbeat,
    CommandKind::ReadClimate,
    CommandKind::CheckStatus,
    CommandKind::ReadPotion,
];

pub struct StatusMonitor {
    store: Arc<dyn DeviceStore>,
    queue: Arc<dyn CommandQueue>,
    interval: Duration,
}

impl StatusMonitor {
    pub fn new(store: Arc<dyn DeviceStore>, queue: Arc<dyn CommandQueue>, interval: Duration) -> Self {
        Self {
            store,
            queue,
            interval,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!("Status monitor started, interval {:?}", self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let now = Local::now().time();
                    match self.tick(now).await {
                        Ok(pushed) => debug!("Status monitor queued {} commands", pushed),
                        Err(e) => error!("Status monitor tick failed: {:#}", e),
                    }
                },
            }
        }
        info!("Status monitor stopped");
    }

    /// Queue one round of commands; returns how many were pushed
    pub async fn tick(&self, now: NaiveTime) -> anyhow::Result<usize> {
        let devices = self.store.list_online().await?;
        info!("{} devices online", devices.len());

        let mut pushed = 0;
        for device in &devices {
            for kind in POLL_COMMANDS {
                if self.push(&device.mac, Command::new(kind)).await {
                    pushed += 1;
                }
            }
            if let Some(command) = scheduled_command(device, now) {
                info!("{} scheduled heater on", device.mac);
                if self.push(&device.mac, command).await {
                    pushed += 1;
                }
            }
        }
        Ok(pushed)
    }

    async fn push(&self, mac: &str, command: Command) -> bool {
        match self.queue.push(mac, &command.to_json()).await {
            Ok(()) => true,
            Err(e) => {
                warn!("{} failed to queue {:?}: {:#}", mac, command.kind, e);
                false
            },
        }
    }
}

/// Heater-on for a scheduled device whose start time is due
pub fn scheduled_command(device: &DeviceRecord, now: NaiveTime) -> Option<Command> {
    if !device.is_scheduled() {
        return None;
    }
    let start = device.schedule_start?;
    if !schedule_due(start, now) {
        return None;
    }
    let duration = u8::try_from(device.last_duration)
        .ok()
        .filter(|d| HEATER_DURATION_RANGE.contains(d));
    match duration {
        Some(duration) => Some(Command::new(CommandKind::HeaterOn { duration })),
        None => {
            warn!(
                "{} scheduled but last duration {} is out of range",
                device.mac, device.last_duration
            );
            None
        },
    }
}

/// Whether `now` is strictly within the window around `start`, across midnight
pub fn schedule_due(start: NaiveTime, now: NaiveTime) -> bool {
    let start = i64::from(start.num_seconds_from_midnight());
    let now = i64::from(now.num_seconds_from_midnight());
    let diff = (start - now).rem_euclid(SECONDS_PER_DAY);
    let distance = diff.min(SECONDS_PER_DAY - diff);
    distance < SCHEDULE_WINDOW_SECS
}
