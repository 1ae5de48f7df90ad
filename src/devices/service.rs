use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use super::{
    database::DeviceDatabase,
    entities::{Device, GatewayKind},
    error::DeviceError,
};
use crate::notifications::{
    entities::{Notification, Outcomes, SendOptions},
    gateway::validate_registration_id,
    service::NotificationService,
};

pub const TEST_SINGLE_MESSAGE: &str = "Test single notification";
pub const TEST_BULK_MESSAGE: &str = "Test bulk notification";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDeviceRequest {
    pub gateway: GatewayKind,
    pub registration_id: String,
    pub name: Option<String>,
    pub device_id: Option<String>,
    pub user: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Result of a console send action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleReport {
    /// Gateway receipts of accepted single sends, or the rendered outcome
    /// mapping of a bulk send
    pub sent: Vec<String>,
    /// Per-recipient outcomes of a bulk send
    #[schema(value_type = Option<Object>)]
    pub outcomes: Option<Outcomes>,
    /// Operator readable reasons of failed sends
    pub errors: Vec<String>,
    pub summary: Vec<String>,
}

impl ConsoleReport {
    fn summarize(mut self, bulk: bool) -> Self {
        if !self.errors.is_empty() {
            self.summary.push(format!(
                "Some messages could not be processed: {:?}",
                self.errors.join(", ")
            ));
        }
        if !self.sent.is_empty() {
            let sent = if bulk {
                self.sent.concat()
            } else {
                self.sent.join(", ")
            };
            let lead = if self.errors.is_empty() {
                "All messages were sent"
            } else {
                "Some messages were sent"
            };
            self.summary.push(format!("{}: {}", lead, sent));
        }
        self
    }
}

fn render_outcomes(outcomes: &Outcomes) -> String {
    let entries: Vec<String> = outcomes
        .iter()
        .map(|(recipient, outcome)| format!("{}: {}", recipient, outcome))
        .collect();
    format!("{{{}}}", entries.join(", "))
}

/// Operator console: device administration and manual sends.
pub struct DeviceService {
    devices: Arc<dyn DeviceDatabase>,
    senders: HashMap<GatewayKind, Arc<NotificationService>>,
}

impl DeviceService {
    pub fn new(
        devices: Arc<dyn DeviceDatabase>,
        senders: HashMap<GatewayKind, Arc<NotificationService>>,
    ) -> Self {
        Self { devices, senders }
    }

    fn sender(&self, gateway: GatewayKind) -> Result<&Arc<NotificationService>, DeviceError> {
        self.senders
            .get(&gateway)
            .ok_or(DeviceError::GatewayUnavailable(gateway))
    }

    pub async fn register_device(
        &self,
        request: RegisterDeviceRequest,
    ) -> Result<Device, DeviceError> {
        let registration_id = request.registration_id.trim();
        if registration_id.is_empty() {
            return Err(DeviceError::InvalidRequest(
                "registrationId must not be empty".to_string(),
            ));
        }
        validate_registration_id(request.gateway, registration_id).map_err(|failure| {
            DeviceError::InvalidRequest(format!(
                "Invalid {} registration id: {}",
                request.gateway, failure
            ))
        })?;

        let device = Device {
            name: request.name,
            device_id: request.device_id,
            user: request.user,
            active: request.active,
            ..Device::new(request.gateway, registration_id)
        };
        self.devices.upsert_device(device).await?;

        self.devices
            .fetch_device(request.gateway, registration_id)
            .await?
            .ok_or_else(|| DeviceError::NotFound(registration_id.to_string()))
    }

    pub async fn list_devices(
        &self,
        gateway: GatewayKind,
        active: Option<bool>,
    ) -> Result<Vec<Device>, DeviceError> {
        Ok(self.devices.list_devices(gateway, active).await?)
    }

    /// Enables or disables the selected devices, returning how many changed.
    #[instrument(skip(self, registration_ids), fields(count = registration_ids.len()))]
    pub async fn set_active(
        &self,
        gateway: GatewayKind,
        registration_ids: &[String],
        active: bool,
    ) -> Result<u64, DeviceError> {
        let updated = self
            .devices
            .update_active(gateway, registration_ids, active)
            .await?;
        info!(updated, "Updated device active flag");
        Ok(updated)
    }

    /// Sends the canned test message to the selected devices.
    pub async fn send_test_message(
        &self,
        gateway: GatewayKind,
        registration_ids: &[String],
        bulk: bool,
    ) -> Result<ConsoleReport, DeviceError> {
        let message = if bulk {
            TEST_BULK_MESSAGE
        } else {
            TEST_SINGLE_MESSAGE
        };
        self.notify(
            gateway,
            registration_ids,
            &Notification::alert(message),
            &SendOptions::default(),
            bulk,
        )
        .await
    }

    /// Sends `notification` to the selected registered devices.
    ///
    /// Single mode addresses every selected device on its own and keeps going
    /// after failures. Bulk mode sends once to the selected active devices.
    #[instrument(skip_all, fields(gateway = %gateway, bulk = bulk))]
    pub async fn notify(
        &self,
        gateway: GatewayKind,
        registration_ids: &[String],
        notification: &Notification,
        options: &SendOptions,
        bulk: bool,
    ) -> Result<ConsoleReport, DeviceError> {
        let sender = self.sender(gateway)?;
        // Invalid options fail the whole request instead of every device
        sender.check_options(options)?;

        let selected = self.devices.fetch_devices(gateway, registration_ids).await?;
        let requested = registration_ids.iter().collect::<HashSet<_>>().len();
        if selected.len() < requested {
            warn!(
                requested,
                found = selected.len(),
                "Some selected devices are not registered"
            );
        }

        let mut report = ConsoleReport::default();

        if bulk {
            let recipients: Vec<String> = selected
                .into_iter()
                .filter(|device| device.active)
                .map(|device| device.registration_id)
                .collect();

            match sender.send_bulk(&recipients, notification, options).await {
                Ok(outcomes) => {
                    if !outcomes.is_empty() {
                        report.sent.push(render_outcomes(&outcomes));
                    }
                    report.outcomes = Some(outcomes);
                }
                Err(err) => report.errors.push(err.status()),
            }
        } else {
            for device in &selected {
                match sender
                    .send_single(&device.registration_id, notification, options)
                    .await
                {
                    Ok(receipt) => report.sent.push(receipt.to_string()),
                    Err(err) => {
                        warn!(device = %device, error = %err, "Test message failed");
                        report.errors.push(err.status());
                    }
                }
            }
        }

        Ok(report.summarize(bulk))
    }
}
