use serde::{Deserialize, Serialize, Serializer};
use std::{collections::BTreeMap, fmt, path::PathBuf, sync::Arc};
use utoipa::ToSchema;

/// Default lifetime of a notification when the caller sets no expiration: 30 days.
pub const DEFAULT_EXPIRATION_SECS: i64 = 2_592_000;

/// Marker reported for recipients the gateway accepted.
pub const SUCCESS_MARKER: &str = "Success";

/// Localization fields of an alert. When any of them is set the payload
/// carries a structured alert instead of a plain string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Localization {
    pub loc_key: Option<String>,
    #[serde(default)]
    pub loc_args: Vec<String>,
    pub action_loc_key: Option<String>,
}

impl Localization {
    pub fn is_empty(&self) -> bool {
        self.loc_key.is_none() && self.loc_args.is_empty() && self.action_loc_key.is_none()
    }
}

/// Badge value, either fixed or computed for each recipient.
#[derive(Clone)]
pub enum Badge {
    Fixed(u32),
    PerRecipient(Arc<dyn Fn(&str) -> u32 + Send + Sync>),
}

impl Badge {
    pub fn per_recipient(f: impl Fn(&str) -> u32 + Send + Sync + 'static) -> Self {
        Badge::PerRecipient(Arc::new(f))
    }

    pub fn resolve(&self, recipient: &str) -> u32 {
        match self {
            Badge::Fixed(value) => *value,
            Badge::PerRecipient(f) => f(recipient),
        }
    }
}

impl fmt::Debug for Badge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Badge::Fixed(value) => f.debug_tuple("Fixed").field(value).finish(),
            Badge::PerRecipient(_) => f.write_str("PerRecipient(..)"),
        }
    }
}

impl From<u32> for Badge {
    fn from(value: u32) -> Self {
        Badge::Fixed(value)
    }
}

/// Gateway independent description of a notification.
#[derive(Debug, Clone, Default)]
pub struct Notification {
    pub alert: Option<String>,
    pub localization: Localization,
    pub badge: Option<Badge>,
    pub sound: Option<String>,
    pub category: Option<String>,
    pub content_available: bool,
    pub mutable_content: bool,
    pub thread_id: Option<String>,
    /// Only meaningful for alerts that open a URL (Safari web push).
    pub url_args: Option<Vec<String>>,
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Notification {
    pub fn alert(text: impl Into<String>) -> Self {
        Self {
            alert: Some(text.into()),
            ..Default::default()
        }
    }
}

/// Notification as accepted over the console API. A per-recipient badge
/// cannot travel over the wire, so only fixed badges are representable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    pub alert: Option<String>,
    #[serde(default)]
    pub localization: Localization,
    pub badge: Option<u32>,
    pub sound: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub content_available: bool,
    #[serde(default)]
    pub mutable_content: bool,
    pub thread_id: Option<String>,
    pub url_args: Option<Vec<String>>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl From<NotificationRequest> for Notification {
    fn from(request: NotificationRequest) -> Self {
        Self {
            alert: request.alert,
            localization: request.localization,
            badge: request.badge.map(Badge::from),
            sound: request.sound,
            category: request.category,
            content_available: request.content_available,
            mutable_content: request.mutable_content,
            thread_id: request.thread_id,
            url_args: request.url_args,
            extra: request.extra,
        }
    }
}

/// Per-call delivery options.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendOptions {
    /// Epoch seconds after which the gateway may drop the notification.
    /// Defaults to now + 30 days.
    pub expiration: Option<i64>,
    /// Raw priority, validated against the gateway's priority values.
    pub priority: Option<String>,
    /// Overrides the configured APNS certificate for this call.
    #[schema(value_type = Option<String>)]
    pub certificate: Option<PathBuf>,
    /// Collapse identifier (`apns-collapse-id` / GCM `collapse_key`).
    pub collapse_id: Option<String>,
}

/// Outcome of a delivery attempt for one recipient of a bulk send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Success,
    /// Native gateway reason, e.g. "Unregistered".
    Failure(String),
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryOutcome::Success)
    }

    pub fn as_str(&self) -> &str {
        match self {
            DeliveryOutcome::Success => SUCCESS_MARKER,
            DeliveryOutcome::Failure(reason) => reason,
        }
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DeliveryOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Recipient identifier to outcome, for bulk sends.
pub type Outcomes = BTreeMap<String, DeliveryOutcome>;

/// Successful single send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub recipient: String,
    /// Identifier assigned by the gateway (`apns-id`, GCM message id, ...).
    pub message_id: Option<String>,
}

impl fmt::Display for Receipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message_id {
            Some(id) => write!(f, "{}", id),
            None => f.write_str(SUCCESS_MARKER),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_recipient_badge_is_evaluated_each_time() {
        let badge = Badge::per_recipient(|recipient| recipient.len() as u32);
        assert_eq!(badge.resolve("ab"), 2);
        assert_eq!(badge.resolve("abcd"), 4);
        assert_eq!(Badge::Fixed(7).resolve("abcd"), 7);
    }

    #[test]
    fn test_outcome_serializes_as_plain_string() {
        let mut outcomes = Outcomes::new();
        outcomes.insert("a".to_string(), DeliveryOutcome::Success);
        outcomes.insert(
            "b".to_string(),
            DeliveryOutcome::Failure("Unregistered".to_string()),
        );

        let json = serde_json::to_value(&outcomes).unwrap();
        assert_eq!(json["a"], "Success");
        assert_eq!(json["b"], "Unregistered");
    }

    #[test]
    fn test_request_converts_fixed_badge() {
        let request = NotificationRequest {
            alert: Some("hi".to_string()),
            badge: Some(3),
            ..Default::default()
        };
        let notification = Notification::from(request);
        assert_eq!(notification.badge.map(|b| b.resolve("x")), Some(3));
    }
}
