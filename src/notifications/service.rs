use std::{collections::HashSet, sync::Arc};
use tracing::{error, info, instrument, warn};

use crate::{
    devices::{database::DeviceDatabase, entities::GatewayKind},
    telemetry::metrics_registry::get_metrics,
};

use super::{
    entities::{
        DEFAULT_EXPIRATION_SECS, DeliveryOutcome, Notification, Outcomes, Receipt, SendOptions,
    },
    error::NotificationError,
    gateway::{DeliveryParams, DeliveryPath, PushTransport},
    payload,
    priority::Priority,
    translator::ErrorTranslator,
};

/// Delivers notifications through one gateway and reconciles the device
/// registry with what the gateway reports.
pub struct NotificationService {
    devices: Arc<dyn DeviceDatabase>,
    transport: Arc<dyn PushTransport>,
    translator: ErrorTranslator,
}

impl NotificationService {
    pub fn new(
        devices: Arc<dyn DeviceDatabase>,
        transport: Arc<dyn PushTransport>,
        translator: ErrorTranslator,
    ) -> Self {
        Self {
            devices,
            transport,
            translator,
        }
    }

    pub fn gateway(&self) -> GatewayKind {
        self.transport.gateway()
    }

    /// Rejects options this gateway cannot honour, such as an unknown priority.
    pub fn check_options(&self, options: &SendOptions) -> Result<(), NotificationError> {
        self.delivery_params(options).map(|_| ())
    }

    /// Validates the options before anything touches the network.
    fn delivery_params(&self, options: &SendOptions) -> Result<DeliveryParams, NotificationError> {
        let priority = options
            .priority
            .as_deref()
            .map(|raw| Priority::parse(self.gateway(), raw))
            .transpose()?;

        let expiration = options
            .expiration
            .filter(|expiration| *expiration > 0)
            .unwrap_or_else(|| chrono::Utc::now().timestamp() + DEFAULT_EXPIRATION_SECS);

        Ok(DeliveryParams {
            expiration,
            priority,
            collapse_id: options.collapse_id.clone(),
        })
    }

    /// Sends to a single recipient.
    ///
    /// On a reconciled transport a rejected delivery is translated, the
    /// device is deactivated when the reason is permanent, and a
    /// [`NotificationError::Server`] is returned. A direct transport returns
    /// the gateway's failure untouched.
    #[instrument(skip(self, notification, options), fields(gateway = %self.gateway()))]
    pub async fn send_single(
        &self,
        recipient: &str,
        notification: &Notification,
        options: &SendOptions,
    ) -> Result<Receipt, NotificationError> {
        let gateway = self.gateway();
        let params = self.delivery_params(options)?;
        let payload = payload::build(gateway, recipient, notification);

        let result = {
            let session = self.transport.connect(options.certificate.clone()).await?;
            session.send_one(recipient, &payload, &params).await
        };

        let failure = match result {
            Ok(message_id) => {
                if let Some(metrics) = get_metrics() {
                    metrics.record_sent(gateway, 1);
                }
                return Ok(Receipt {
                    recipient: recipient.to_string(),
                    message_id,
                });
            }
            Err(failure) => failure,
        };

        if self.transport.delivery_path() == DeliveryPath::Direct {
            return Err(NotificationError::Delivery { gateway, failure });
        }

        let reason = self.translator.translate(gateway, &failure.reason);
        if let Some(metrics) = get_metrics() {
            metrics.record_failure(gateway, reason.as_str(), reason.is_permanent());
        }

        if reason.is_permanent() {
            self.deactivate_device(gateway, recipient).await;
        } else {
            warn!(recipient, %failure, "Delivery failed");
        }

        Err(NotificationError::Server { gateway, reason })
    }

    /// Sends to many recipients and returns the outcome of each.
    ///
    /// On a reconciled transport every recipient whose outcome is a permanent
    /// failure is deactivated with a single registry update.
    #[instrument(skip_all, fields(gateway = %self.gateway(), count = recipients.len()))]
    pub async fn send_bulk(
        &self,
        recipients: &[String],
        notification: &Notification,
        options: &SendOptions,
    ) -> Result<Outcomes, NotificationError> {
        let gateway = self.gateway();
        let params = self.delivery_params(options)?;

        let mut seen = HashSet::new();
        let batch: Vec<_> = recipients
            .iter()
            .filter(|recipient| seen.insert(*recipient))
            .map(|recipient| {
                (
                    recipient.clone(),
                    payload::build(gateway, recipient, notification),
                )
            })
            .collect();

        if batch.is_empty() {
            return Ok(Outcomes::new());
        }

        let outcomes = {
            let session = self.transport.connect(options.certificate.clone()).await?;
            session.send_batch(batch, &params).await
        };

        if self.transport.delivery_path() == DeliveryPath::Direct {
            return Ok(outcomes);
        }

        let metrics = get_metrics();
        if let Some(metrics) = &metrics {
            let sent = outcomes.values().filter(|outcome| outcome.is_success()).count();
            metrics.record_sent(gateway, sent as u64);
        }

        let mut invalid = Vec::new();
        for (recipient, outcome) in &outcomes {
            let DeliveryOutcome::Failure(native) = outcome else {
                continue;
            };
            let reason = self.translator.translate(gateway, native);
            if let Some(metrics) = &metrics {
                metrics.record_failure(gateway, reason.as_str(), reason.is_permanent());
            }
            if reason.is_permanent() {
                invalid.push(recipient.clone());
            }
        }

        if !invalid.is_empty() {
            match self.devices.update_active(gateway, &invalid, false).await {
                Ok(updated) => {
                    info!(count = updated, "Deactivated devices reported as invalid");
                    if let Some(metrics) = &metrics {
                        metrics.record_deactivated(gateway, updated);
                    }
                }
                Err(err) => error!(error = %err, count = invalid.len(), "Failed to deactivate devices"),
            }
        }

        Ok(outcomes)
    }

    async fn deactivate_device(&self, gateway: GatewayKind, recipient: &str) {
        let device = match self.devices.fetch_device(gateway, recipient).await {
            Ok(Some(device)) => device,
            Ok(None) => {
                warn!(recipient, "Permanently invalid recipient is not a registered device");
                return;
            }
            Err(err) => {
                error!(error = %err, recipient, "Failed to look up invalid device");
                return;
            }
        };

        match self
            .devices
            .update_active(gateway, &[device.registration_id], false)
            .await
        {
            Ok(updated) => {
                info!(recipient, "Deactivated device reported as invalid");
                if let Some(metrics) = get_metrics() {
                    metrics.record_deactivated(gateway, updated);
                }
            }
            Err(err) => error!(error = %err, recipient, "Failed to deactivate device"),
        }
    }
}
