pub mod apns;
pub mod dummy;
pub mod gcm;
pub mod wns;

use async_trait::async_trait;
use std::path::PathBuf;

use crate::devices::entities::GatewayKind;

use super::{
    entities::Outcomes,
    error::{GatewayFailure, NotificationError},
    payload::GatewayPayload,
    priority::Priority,
};

/// Gateway-level delivery parameters shared by every recipient of a send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryParams {
    /// Epoch seconds
    pub expiration: i64,
    pub priority: Option<Priority>,
    pub collapse_id: Option<String>,
}

impl DeliveryParams {
    /// Seconds left until expiration, never negative.
    pub fn time_to_live(&self) -> i64 {
        (self.expiration - chrono::Utc::now().timestamp()).max(0)
    }
}

/// Rejects registration ids the gateway could never deliver to.
pub fn validate_registration_id(
    gateway: GatewayKind,
    registration_id: &str,
) -> Result<(), GatewayFailure> {
    match gateway {
        GatewayKind::Apns => apns::validate_device_token(registration_id),
        GatewayKind::Gcm => Ok(()),
        GatewayKind::Wns => wns::validate_channel_uri(registration_id).map(|_| ()),
    }
}

/// How the delivery service treats results of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPath {
    /// Failures are translated and permanently invalid devices deactivated.
    Reconciled,
    /// Results are handed back to the caller untouched.
    Direct,
}

/// Opens sessions to one vendor gateway.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushTransport: Send + Sync {
    fn gateway(&self) -> GatewayKind;

    fn delivery_path(&self) -> DeliveryPath;

    /// Opens a session. `certificate` overrides the configured client
    /// certificate where the gateway uses one.
    async fn connect(
        &self,
        certificate: Option<PathBuf>,
    ) -> Result<Box<dyn TransportSession>, NotificationError>;
}

/// An open session. Dropped as soon as the send it was opened for completes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransportSession: Send + Sync {
    /// Delivers to one recipient, returning the gateway's message id.
    async fn send_one(
        &self,
        recipient: &str,
        payload: &GatewayPayload,
        params: &DeliveryParams,
    ) -> Result<Option<String>, GatewayFailure>;

    /// Delivers to many recipients. Per-recipient failures are reported in
    /// the returned outcomes, never as an error.
    async fn send_batch(
        &self,
        batch: Vec<(String, GatewayPayload)>,
        params: &DeliveryParams,
    ) -> Outcomes;
}
