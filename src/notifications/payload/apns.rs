use serde::Serialize;
use serde_json::{Map, Value};

use crate::notifications::{entities::Notification, error::GatewayFailure};

/// Largest payload APNS accepts for regular remote notifications.
pub const MAX_PAYLOAD_BYTES: usize = 4096;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApnsPayload {
    pub aps: Aps,
    #[serde(flatten)]
    pub custom: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Aps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<ApnsAlert>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_available: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mutable_content: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_args: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ApnsAlert {
    Plain(String),
    Localized(LocalizedAlert),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct LocalizedAlert {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loc_key: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub loc_args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_loc_key: Option<String>,
}

impl ApnsPayload {
    /// Serializes the payload, refusing anything above [`MAX_PAYLOAD_BYTES`].
    pub fn to_bytes(&self) -> Result<Vec<u8>, GatewayFailure> {
        let bytes = serde_json::to_vec(self)
            .map_err(|err| GatewayFailure::with_detail("InvalidPayload", err.to_string()))?;

        if bytes.len() > MAX_PAYLOAD_BYTES {
            return Err(GatewayFailure::with_detail(
                "PayloadTooLarge",
                format!("{} bytes", bytes.len()),
            ));
        }

        Ok(bytes)
    }
}

pub fn build(recipient: &str, notification: &Notification) -> ApnsPayload {
    let alert = if notification.localization.is_empty() {
        notification.alert.clone().map(ApnsAlert::Plain)
    } else {
        let localization = &notification.localization;
        Some(ApnsAlert::Localized(LocalizedAlert {
            body: notification.alert.clone(),
            loc_key: localization.loc_key.clone(),
            loc_args: localization.loc_args.clone(),
            action_loc_key: localization.action_loc_key.clone(),
        }))
    };

    let aps = Aps {
        alert,
        badge: notification
            .badge
            .as_ref()
            .map(|badge| badge.resolve(recipient)),
        sound: notification.sound.clone(),
        content_available: notification.content_available.then_some(1),
        mutable_content: notification.mutable_content.then_some(1),
        category: notification.category.clone(),
        url_args: notification.url_args.clone(),
        thread_id: notification.thread_id.clone(),
    };

    // `aps` is reserved for the dictionary built above
    let custom = notification
        .extra
        .iter()
        .filter(|(key, _)| key.as_str() != "aps")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    ApnsPayload { aps, custom }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::entities::{Badge, Localization};
    use serde_json::json;

    #[test]
    fn test_plain_alert() {
        let payload = build("token", &Notification::alert("Hello"));
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json, json!({ "aps": { "alert": "Hello" } }));
    }

    #[test]
    fn test_localized_alert_wins_over_plain_string() {
        let notification = Notification {
            alert: Some("Hello".to_string()),
            localization: Localization {
                loc_key: Some("GREETING".to_string()),
                loc_args: vec!["Jane".to_string()],
                action_loc_key: None,
            },
            ..Default::default()
        };

        let payload = build("token", &notification);
        let json = serde_json::to_value(&payload).unwrap();

        assert!(matches!(payload.aps.alert, Some(ApnsAlert::Localized(_))));
        assert_eq!(
            json["aps"]["alert"],
            json!({ "body": "Hello", "loc-key": "GREETING", "loc-args": ["Jane"] })
        );
    }

    #[test]
    fn test_action_loc_key_alone_produces_localized_alert() {
        let notification = Notification {
            localization: Localization {
                action_loc_key: Some("OPEN".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let json = serde_json::to_value(build("token", &notification)).unwrap();
        assert_eq!(json["aps"]["alert"], json!({ "action-loc-key": "OPEN" }));
    }

    #[test]
    fn test_badge_is_evaluated_per_recipient() {
        let notification = Notification {
            badge: Some(Badge::per_recipient(|recipient| {
                if recipient == "first" { 1 } else { 2 }
            })),
            ..Default::default()
        };

        assert_eq!(build("first", &notification).aps.badge, Some(1));
        assert_eq!(build("second", &notification).aps.badge, Some(2));
    }

    #[test]
    fn test_full_payload_shape() {
        let mut extra = Map::new();
        extra.insert("conversation".to_string(), json!("c-42"));

        let notification = Notification {
            alert: Some("New message".to_string()),
            badge: Some(Badge::Fixed(3)),
            sound: Some("default".to_string()),
            category: Some("MESSAGE".to_string()),
            content_available: true,
            mutable_content: true,
            thread_id: Some("c-42".to_string()),
            url_args: Some(vec!["inbox".to_string()]),
            extra,
            ..Default::default()
        };

        let json = serde_json::to_value(build("token", &notification)).unwrap();
        assert_eq!(
            json,
            json!({
                "aps": {
                    "alert": "New message",
                    "badge": 3,
                    "sound": "default",
                    "content-available": 1,
                    "mutable-content": 1,
                    "category": "MESSAGE",
                    "url-args": ["inbox"],
                    "thread-id": "c-42"
                },
                "conversation": "c-42"
            })
        );
    }

    #[test]
    fn test_custom_data_cannot_replace_aps() {
        let mut extra = Map::new();
        extra.insert("aps".to_string(), json!({ "badge": 99 }));
        extra.insert("conversation".to_string(), json!("c-1"));
        let notification = Notification {
            extra,
            ..Notification::alert("hi")
        };

        let bytes = build("token", &notification).to_bytes().unwrap();
        let text = String::from_utf8(bytes).unwrap();

        assert_eq!(text.matches("\"aps\"").count(), 1);
        assert_eq!(
            serde_json::from_str::<Value>(&text).unwrap(),
            json!({ "aps": { "alert": "hi" }, "conversation": "c-1" })
        );
    }

    #[test]
    fn test_oversized_payload_is_rejected() {
        let payload = build("token", &Notification::alert("x".repeat(MAX_PAYLOAD_BYTES)));
        let failure = payload.to_bytes().unwrap_err();
        assert_eq!(failure.reason, "PayloadTooLarge");
    }
}
