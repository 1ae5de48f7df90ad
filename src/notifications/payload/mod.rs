pub mod apns;
pub mod gcm;
pub mod wns;

use crate::devices::entities::GatewayKind;

use super::entities::Notification;
use apns::ApnsPayload;
use gcm::GcmPayload;
use wns::WnsPayload;

/// A payload in the wire shape of one gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayPayload {
    Apns(ApnsPayload),
    Gcm(GcmPayload),
    Wns(WnsPayload),
}

impl GatewayPayload {
    pub fn gateway(&self) -> GatewayKind {
        match self {
            GatewayPayload::Apns(_) => GatewayKind::Apns,
            GatewayPayload::Gcm(_) => GatewayKind::Gcm,
            GatewayPayload::Wns(_) => GatewayKind::Wns,
        }
    }
}

/// Builds the payload `recipient` receives on `gateway`. Pure: no network,
/// no registry access.
pub fn build(gateway: GatewayKind, recipient: &str, notification: &Notification) -> GatewayPayload {
    match gateway {
        GatewayKind::Apns => GatewayPayload::Apns(apns::build(recipient, notification)),
        GatewayKind::Gcm => GatewayPayload::Gcm(gcm::build(recipient, notification)),
        GatewayKind::Wns => GatewayPayload::Wns(wns::build(recipient, notification)),
    }
}
