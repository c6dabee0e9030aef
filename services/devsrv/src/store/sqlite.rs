//! SQLite device store

use super::{DeviceRecord, DeviceStore, DeviceUpdate, NewDevice};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use common::sqlite::SqliteClient;
use tracing::debug;

pub const DEVICE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS device (
        mac TEXT PRIMARY KEY,
        mode INTEGER NOT NULL DEFAULT 0,
        schedule_start TEXT,
        last_duration INTEGER NOT NULL DEFAULT 0,
        online BOOLEAN NOT NULL DEFAULT FALSE,
        power INTEGER NOT NULL DEFAULT 0,
        dosage REAL NOT NULL DEFAULT 0,
        temperature REAL NOT NULL DEFAULT 0,
        humidity REAL NOT NULL DEFAULT 0,
        ip TEXT NOT NULL DEFAULT '',
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL
    )
"#;

const SELECT_COLUMNS: &str = "SELECT mac, mode, schedule_start, last_duration, online, power, \
     dosage, temperature, humidity, ip, created_at, updated_at FROM device";

/// Device records in the `device` table
#[derive(Clone, Debug)]
pub struct SqliteDeviceStore {
    client: SqliteClient,
}

impl SqliteDeviceStore {
    /// Wrap a client and create the table if missing
    pub async fn new(client: SqliteClient) -> Result<Self> {
        let store = Self { client };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(DEVICE_TABLE)
            .execute(self.client.pool())
            .await
            .context("Failed to create device table")?;
        debug!("Device table ready in {}", self.client.path());
        Ok(())
    }
}

#[async_trait]
impl DeviceStore for SqliteDeviceStore {
    async fn find(&self, mac: &str) -> Result<Option<DeviceRecord>> {
        sqlx::query_as::<_, DeviceRecord>(&format!("{} WHERE mac = ?", SELECT_COLUMNS))
            .bind(mac)
            .fetch_optional(self.client.pool())
            .await
            .with_context(|| format!("Failed to load device {}", mac))
    }

    async fn insert(&self, device: NewDevice) -> Result<DeviceRecord> {
        let record = device.into_record(Utc::now());
        sqlx::query(
            "INSERT INTO device (mac, mode, last_duration, online, power, dosage, temperature, \
             humidity, ip, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.mac)
        .bind(record.mode)
        .bind(record.last_duration)
        .bind(record.online)
        .bind(record.power)
        .bind(record.dosage)
        .bind(record.temperature)
        .bind(record.humidity)
        .bind(&record.ip)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(self.client.pool())
        .await
        .with_context(|| format!("Failed to insert device {}", record.mac))?;
        Ok(record)
    }

    async fn apply(&self, mac: &str, update: DeviceUpdate) -> Result<bool> {
        let now = Utc::now();
        let query = match update {
            DeviceUpdate::Online(online) => {
                sqlx::query("UPDATE device SET online = ?, updated_at = ? WHERE mac = ?")
                    .bind(online)
            },
            DeviceUpdate::Power(power) => {
                sqlx::query("UPDATE device SET power = ?, updated_at = ? WHERE mac = ?").bind(power)
            },
            DeviceUpdate::Dosage(dosage) => {
                sqlx::query("UPDATE device SET dosage = ?, updated_at = ? WHERE mac = ?")
                    .bind(dosage)
            },
            DeviceUpdate::Climate {
                temperature,
                humidity,
            } => sqlx::query(
                "UPDATE device SET temperature = ?, humidity = ?, updated_at = ? WHERE mac = ?",
            )
            .bind(temperature)
            .bind(humidity),
        };

        let result = query
            .bind(now)
            .bind(mac)
            .execute(self.client.pool())
            .await
            .with_context(|| format!("Failed to apply {:?} to {}", update, mac))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, mac: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM device WHERE mac = ?")
            .bind(mac)
            .execute(self.client.pool())
            .await
            .with_context(|| format!("Failed to delete device {}", mac))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_online(&self) -> Result<Vec<DeviceRecord>> {
        sqlx::query_as::<_, DeviceRecord>(&format!(
            "{} WHERE online = 1 ORDER BY mac",
            SELECT_COLUMNS
        ))
        .fetch_all(self.client.pool())
        .await
        .context("Failed to list online devices")
    }
}
