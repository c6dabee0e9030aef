//! Device record storage
//!
//! Implementations:
//! - `SqliteDeviceStore`: production backend on a `device` table
//! - `MemoryDeviceStore`: in-memory backend for testing

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

pub use memory::MemoryDeviceStore;
pub use sqlite::SqliteDeviceStore;

/// Operating mode value for a scheduled device
pub const MODE_SCHEDULED: i32 = 1;

/// Dosage value meaning the cartridge is missing
pub const DOSAGE_NO_CARTRIDGE: f64 = -1.0;

/// Dosage value meaning the cartridge is empty
pub const DOSAGE_EMPTY: f64 = 0.0;

/// One row of the `device` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeviceRecord {
    pub mac: String,
    /// 0 manual, 1 scheduled
    pub mode: i32,
    /// Time of day a scheduled device switches its heater on
    pub schedule_start: Option<NaiveTime>,
    /// Heater duration used for scheduled switch-on
    pub last_duration: i32,
    pub online: bool,
    pub power: i32,
    pub dosage: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub ip: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeviceRecord {
    pub fn is_scheduled(&self) -> bool {
        self.mode == MODE_SCHEDULED
    }
}

/// Record created when an identifier is seen for the first time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDevice {
    pub mac: String,
    pub ip: String,
}

impl NewDevice {
    pub fn new(mac: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            mac: mac.into(),
            ip: ip.into(),
        }
    }

    /// Online record with default settings and both timestamps set to `now`
    pub fn into_record(self, now: DateTime<Utc>) -> DeviceRecord {
        DeviceRecord {
            mac: self.mac,
            mode: 0,
            schedule_start: None,
            last_duration: 0,
            online: true,
            power: 0,
            dosage: DOSAGE_EMPTY,
            temperature: 0.0,
            humidity: 0.0,
            ip: self.ip,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The unconditional single-field writes a session issues
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceUpdate {
    Online(bool),
    Power(i32),
    Dosage(f64),
    Climate { temperature: f64, humidity: f64 },
}

impl DeviceUpdate {
    /// Apply to an in-memory record
    pub fn apply_to(&self, record: &mut DeviceRecord, now: DateTime<Utc>) {
        match *self {
            Self::Online(online) => record.online = online,
            Self::Power(power) => record.power = power,
            Self::Dosage(dosage) => record.dosage = dosage,
            Self::Climate {
                temperature,
                humidity,
            } => {
                record.temperature = temperature;
                record.humidity = humidity;
            },
        }
        record.updated_at = now;
    }
}

/// Device state gateway
///
/// Writes are keyed by identifier and unconditional; conflicting writes to
/// the same record are serialized by the backend.
#[async_trait]
pub trait DeviceStore: Send + Sync + 'static {
    /// Look up one device
    async fn find(&self, mac: &str) -> Result<Option<DeviceRecord>>;

    /// Create a device record
    async fn insert(&self, device: NewDevice) -> Result<DeviceRecord>;

    /// Apply one update; returns false if no record matched
    async fn apply(&self, mac: &str, update: DeviceUpdate) -> Result<bool>;

    /// Remove a device record; returns false if none existed
    async fn delete(&self, mac: &str) -> Result<bool>;

    /// All devices with the online flag set
    async fn list_online(&self) -> Result<Vec<DeviceRecord>>;
}
