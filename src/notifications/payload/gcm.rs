use serde::Serialize;
use serde_json::{Map, Value};

use crate::notifications::entities::Notification;

/// Message body shared by every recipient of a GCM request. Addressing and
/// delivery options are added by the transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GcmPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<GcmNotification>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub content_available: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub mutable_content: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GcmNotification {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_loc_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_loc_args: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub click_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// Data key carrying the APNS style action button title, which FCM has no
/// notification field for.
pub const ACTION_LOC_KEY: &str = "action_loc_key";

pub fn build(recipient: &str, notification: &Notification) -> GcmPayload {
    let localization = &notification.localization;
    let has_visible_part = notification.alert.is_some()
        || localization.loc_key.is_some()
        || !localization.loc_args.is_empty()
        || notification.sound.is_some()
        || notification.badge.is_some();

    let visible = has_visible_part.then(|| GcmNotification {
        body: notification.alert.clone(),
        body_loc_key: localization.loc_key.clone(),
        // FCM expects the arguments as a JSON array encoded in a string
        body_loc_args: (!localization.loc_args.is_empty())
            .then(|| Value::from(localization.loc_args.clone()).to_string()),
        sound: notification.sound.clone(),
        badge: notification
            .badge
            .as_ref()
            .map(|badge| badge.resolve(recipient).to_string()),
        click_action: notification.category.clone(),
        tag: notification.thread_id.clone(),
    });

    let mut data = notification.extra.clone();
    if let Some(action) = &localization.action_loc_key {
        data.entry(ACTION_LOC_KEY)
            .or_insert_with(|| Value::from(action.clone()));
    }

    GcmPayload {
        notification: visible,
        data,
        content_available: notification.content_available,
        mutable_content: notification.mutable_content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::entities::{Badge, Localization};
    use serde_json::json;

    #[test]
    fn test_data_only_message() {
        let mut extra = Map::new();
        extra.insert("sync".to_string(), json!(true));
        let notification = Notification {
            extra,
            content_available: true,
            ..Default::default()
        };

        let json = serde_json::to_value(build("token", &notification)).unwrap();
        assert_eq!(json, json!({ "data": { "sync": true }, "content_available": true }));
    }

    #[test]
    fn test_badge_and_sound_without_alert_are_kept() {
        let notification = Notification {
            badge: Some(Badge::Fixed(4)),
            sound: Some("chime".to_string()),
            localization: Localization {
                loc_key: None,
                loc_args: vec!["Jane".to_string()],
                action_loc_key: Some("OPEN".to_string()),
            },
            ..Default::default()
        };

        let json = serde_json::to_value(build("token", &notification)).unwrap();
        assert_eq!(
            json,
            json!({
                "notification": {
                    "body_loc_args": "[\"Jane\"]",
                    "sound": "chime",
                    "badge": "4"
                },
                "data": { "action_loc_key": "OPEN" }
            })
        );
    }

    #[test]
    fn test_visible_message_with_localization() {
        let notification = Notification {
            alert: Some("Hello".to_string()),
            localization: Localization {
                loc_key: Some("GREETING".to_string()),
                loc_args: vec!["Jane".to_string()],
                action_loc_key: None,
            },
            badge: Some(Badge::per_recipient(|r| r.len() as u32)),
            ..Default::default()
        };

        let json = serde_json::to_value(build("abc", &notification)).unwrap();
        assert_eq!(
            json["notification"],
            json!({
                "body": "Hello",
                "body_loc_key": "GREETING",
                "body_loc_args": "[\"Jane\"]",
                "badge": "3"
            })
        );
    }
}
