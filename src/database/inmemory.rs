use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::devices::{
    database::{DeviceDatabase, DeviceDatabaseError},
    entities::{Device, GatewayKind},
};

/// Devices keyed by gateway kind and registration id.
pub struct InMemoryDatabase {
    pub devices: Mutex<HashMap<(GatewayKind, String), Device>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        InMemoryDatabase {
            devices: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceDatabase for InMemoryDatabase {
    async fn upsert_device(&self, device: Device) -> Result<(), DeviceDatabaseError> {
        let mut device_lock = self
            .devices
            .lock()
            .map_err(|_| DeviceDatabaseError::OperationFailed)?;

        let key = (device.gateway, device.registration_id.clone());
        match device_lock.get_mut(&key) {
            // Re-registering keeps the device id
            Some(existing) => {
                existing.name = device.name;
                existing.device_id = device.device_id;
                existing.user = device.user;
                existing.active = device.active;
            }
            None => {
                device_lock.insert(key, device);
            }
        }
        Ok(())
    }

    async fn fetch_device(
        &self,
        gateway: GatewayKind,
        registration_id: &str,
    ) -> Result<Option<Device>, DeviceDatabaseError> {
        let device_lock = self
            .devices
            .lock()
            .map_err(|_| DeviceDatabaseError::OperationFailed)?;

        Ok(device_lock
            .get(&(gateway, registration_id.to_string()))
            .cloned())
    }

    async fn fetch_devices(
        &self,
        gateway: GatewayKind,
        registration_ids: &[String],
    ) -> Result<Vec<Device>, DeviceDatabaseError> {
        let device_lock = self
            .devices
            .lock()
            .map_err(|_| DeviceDatabaseError::OperationFailed)?;

        // Repeated ids match once, like an IN list
        let mut seen = HashSet::new();
        Ok(registration_ids
            .iter()
            .filter(|id| seen.insert(*id))
            .filter_map(|id| device_lock.get(&(gateway, id.clone())).cloned())
            .collect())
    }

    async fn list_devices(
        &self,
        gateway: GatewayKind,
        active: Option<bool>,
    ) -> Result<Vec<Device>, DeviceDatabaseError> {
        let device_lock = self
            .devices
            .lock()
            .map_err(|_| DeviceDatabaseError::OperationFailed)?;

        let mut devices: Vec<Device> = device_lock
            .values()
            .filter(|device| device.gateway == gateway)
            .filter(|device| active.is_none_or(|active| device.active == active))
            .cloned()
            .collect();
        devices.sort_by_key(|device| device.created_at);
        Ok(devices)
    }

    async fn update_active(
        &self,
        gateway: GatewayKind,
        registration_ids: &[String],
        active: bool,
    ) -> Result<u64, DeviceDatabaseError> {
        let mut device_lock = self
            .devices
            .lock()
            .map_err(|_| DeviceDatabaseError::OperationFailed)?;

        let mut updated = 0;
        for id in registration_ids {
            if let Some(device) = device_lock.get_mut(&(gateway, id.clone())) {
                device.active = active;
                updated += 1;
            }
        }
        Ok(updated)
    }
}
