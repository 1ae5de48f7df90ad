use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

use super::{DeliveryParams, DeliveryPath, PushTransport, TransportSession};
use crate::{
    devices::entities::GatewayKind,
    notifications::{
        entities::{DeliveryOutcome, Outcomes},
        error::{GatewayFailure, NotificationError},
        payload::GatewayPayload,
    },
};

/// Logs notifications instead of sending them. Used in development for
/// gateways without credentials.
pub struct DummyTransport {
    gateway: GatewayKind,
}

impl DummyTransport {
    pub fn new(gateway: GatewayKind) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl PushTransport for DummyTransport {
    fn gateway(&self) -> GatewayKind {
        self.gateway
    }

    fn delivery_path(&self) -> DeliveryPath {
        DeliveryPath::Reconciled
    }

    async fn connect(
        &self,
        _certificate: Option<PathBuf>,
    ) -> Result<Box<dyn TransportSession>, NotificationError> {
        Ok(Box::new(DummySession {
            gateway: self.gateway,
        }))
    }
}

struct DummySession {
    gateway: GatewayKind,
}

#[async_trait]
impl TransportSession for DummySession {
    async fn send_one(
        &self,
        recipient: &str,
        payload: &GatewayPayload,
        _params: &DeliveryParams,
    ) -> Result<Option<String>, GatewayFailure> {
        if payload.gateway() != self.gateway {
            return Err(GatewayFailure::new("PayloadMismatch"));
        }
        info!(gateway = %self.gateway, %recipient, ?payload, "Notification");
        Ok(None)
    }

    async fn send_batch(
        &self,
        batch: Vec<(String, GatewayPayload)>,
        _params: &DeliveryParams,
    ) -> Outcomes {
        batch
            .into_iter()
            .map(|(recipient, payload)| {
                if payload.gateway() != self.gateway {
                    return (recipient, DeliveryOutcome::Failure("PayloadMismatch".to_string()));
                }
                info!(gateway = %self.gateway, %recipient, ?payload, "Notification");
                (recipient, DeliveryOutcome::Success)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{entities::Notification, payload};

    fn params() -> DeliveryParams {
        DeliveryParams {
            expiration: 0,
            priority: None,
            collapse_id: None,
        }
    }

    #[tokio::test]
    async fn test_dummy_session_accepts_matching_payloads() {
        let session = DummyTransport::new(GatewayKind::Gcm)
            .connect(None)
            .await
            .unwrap();
        let notification = Notification::alert("hi");

        let batch = vec![
            (
                "a".to_string(),
                payload::build(GatewayKind::Gcm, "a", &notification),
            ),
            (
                "b".to_string(),
                payload::build(GatewayKind::Apns, "b", &notification),
            ),
        ];
        let outcomes = session.send_batch(batch, &params()).await;

        assert_eq!(outcomes["a"], DeliveryOutcome::Success);
        assert_eq!(
            outcomes["b"],
            DeliveryOutcome::Failure("PayloadMismatch".to_string())
        );
    }
}
