use async_trait::async_trait;

use super::entities::{Device, GatewayKind};

#[derive(Debug, thiserror::Error)]
pub enum DeviceDatabaseError {
    #[error("Database operation failed")]
    OperationFailed,
}

/// Device registry. Deactivation goes through `update_active` only; devices
/// are never deleted by the delivery path.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceDatabase: Send + Sync {
    async fn upsert_device(&self, device: Device) -> Result<(), DeviceDatabaseError>;

    async fn fetch_device(
        &self,
        gateway: GatewayKind,
        registration_id: &str,
    ) -> Result<Option<Device>, DeviceDatabaseError>;

    async fn fetch_devices(
        &self,
        gateway: GatewayKind,
        registration_ids: &[String],
    ) -> Result<Vec<Device>, DeviceDatabaseError>;

    async fn list_devices(
        &self,
        gateway: GatewayKind,
        active: Option<bool>,
    ) -> Result<Vec<Device>, DeviceDatabaseError>;

    /// Sets the active flag on every listed device and returns how many rows matched.
    async fn update_active(
        &self,
        gateway: GatewayKind,
        registration_ids: &[String],
        active: bool,
    ) -> Result<u64, DeviceDatabaseError>;
}
