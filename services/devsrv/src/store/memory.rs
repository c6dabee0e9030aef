//! In-memory device store
//!
//! Uses DashMap for concurrent access. Every applied update is also appended
//! to a history log so tests can assert how often a write happened.

use super::{DeviceRecord, DeviceStore, DeviceUpdate, NewDevice};
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// In-memory device store with concurrent access support
#[derive(Clone, Default)]
pub struct MemoryDeviceStore {
    devices: Arc<DashMap<String, DeviceRecord>>,
    history: Arc<Mutex<Vec<(String, DeviceUpdate)>>>,
}

impl MemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly, bypassing `insert`
    pub fn put(&self, record: DeviceRecord) {
        self.devices.insert(record.mac.clone(), record);
    }

    /// Snapshot of one record
    pub fn get(&self, mac: &str) -> Option<DeviceRecord> {
        self.devices.get(mac).map(|r| r.clone())
    }

    /// Every update applied so far, in order
    pub fn history(&self) -> Vec<(String, DeviceUpdate)> {
        self.history.lock().clone()
    }

    /// Updates applied to one device
    pub fn updates_for(&self, mac: &str) -> Vec<DeviceUpdate> {
        self.history
            .lock()
            .iter()
            .filter(|(m, _)| m == mac)
            .map(|(_, u)| *u)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[async_trait]
impl DeviceStore for MemoryDeviceStore {
    async fn find(&self, mac: &str) -> Result<Option<DeviceRecord>> {
        Ok(self.get(mac))
    }

    async fn insert(&self, device: NewDevice) -> Result<DeviceRecord> {
        if self.devices.contains_key(&device.mac) {
            bail!("Device {} already exists", device.mac);
        }
        let record = device.into_record(Utc::now());
        self.devices.insert(record.mac.clone(), record.clone());
        Ok(record)
    }

    async fn apply(&self, mac: &str, update: DeviceUpdate) -> Result<bool> {
        self.history.lock().push((mac.to_string(), update));
        match self.devices.get_mut(mac) {
            Some(mut record) => {
                update.apply_to(&mut record, Utc::now());
                Ok(true)
            },
            None => Ok(false),
        }
    }

    async fn delete(&self, mac: &str) -> Result<bool> {
        Ok(self.devices.remove(mac).is_some())
    }

    async fn list_online(&self) -> Result<Vec<DeviceRecord>> {
        let mut online: Vec<DeviceRecord> = self
            .devices
            .iter()
            .filter(|r| r.online)
            .map(|r| r.clone())
            .collect();
        online.sort_by(|a, b| a.mac.cmp(&b.mac));
        Ok(online)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_find_delete() {
        let store = MemoryDeviceStore::new();
        store
            .insert(NewDevice::new("0123456789AB", "127.0.0.1"))
            .await
            .unwrap();

        let found = store.find("0123456789AB").await.unwrap().unwrap();
        assert!(found.online);

        // Duplicate insert is refused
        assert!(store
            .insert(NewDevice::new("0123456789AB", "127.0.0.1"))
            .await
            .is_err());

        assert!(store.delete("0123456789AB").await.unwrap());
        assert!(!store.delete("0123456789AB").await.unwrap());
        assert!(store.find("0123456789AB").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_records_history() {
        let store = MemoryDeviceStore::new();
        store
            .insert(NewDevice::new("AAAAAAAAAAAA", "127.0.0.1"))
            .await
            .unwrap();

        assert!(store
            .apply("AAAAAAAAAAAA", DeviceUpdate::Power(6))
            .await
            .unwrap());
        assert!(!store
            .apply("BBBBBBBBBBBB", DeviceUpdate::Online(false))
            .await
            .unwrap());

        assert_eq!(store.get("AAAAAAAAAAAA").unwrap().power, 6);
        assert_eq!(store.history().len(), 2);
        assert_eq!(
            store.updates_for("AAAAAAAAAAAA"),
            vec![DeviceUpdate::Power(6)]
        );
    }

    #[tokio::test]
    async fn test_list_online() {
        let store = MemoryDeviceStore::new();
        for mac in ["000000000002", "000000000001", "000000000003"] {
            store.insert(NewDevice::new(mac, "127.0.0.1")).await.unwrap();
        }
        store
            .apply("000000000003", DeviceUpdate::Online(false))
            .await
            .unwrap();

        let macs: Vec<String> = store
            .list_online()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.mac)
            .collect();
        assert_eq!(macs, vec!["000000000001", "000000000002"]);
    }
}
