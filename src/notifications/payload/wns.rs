use serde_json::Value;

use crate::notifications::entities::Notification;

/// WNS notification body together with its `X-WNS-Type`.
#[derive(Debug, Clone, PartialEq)]
pub enum WnsPayload {
    /// `wns/toast`, XML body
    Toast(String),
    /// `wns/raw`, opaque body delivered to the app
    Raw(String),
}

impl WnsPayload {
    pub fn wns_type(&self) -> &'static str {
        match self {
            WnsPayload::Toast(_) => "wns/toast",
            WnsPayload::Raw(_) => "wns/raw",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            WnsPayload::Toast(_) => "text/xml",
            WnsPayload::Raw(_) => "application/octet-stream",
        }
    }

    pub fn body(&self) -> &str {
        match self {
            WnsPayload::Toast(body) | WnsPayload::Raw(body) => body,
        }
    }
}

pub fn build(_recipient: &str, notification: &Notification) -> WnsPayload {
    let Some(alert) = &notification.alert else {
        return WnsPayload::Raw(Value::Object(notification.extra.clone()).to_string());
    };

    let launch = if notification.extra.is_empty() {
        String::new()
    } else {
        format!(
            " launch=\"{}\"",
            escape_xml(&Value::Object(notification.extra.clone()).to_string())
        )
    };
    let audio = notification
        .sound
        .as_ref()
        .map(|sound| format!("<audio src=\"{}\"/>", escape_xml(sound)))
        .unwrap_or_default();

    WnsPayload::Toast(format!(
        "<toast{launch}><visual><binding template=\"ToastText01\"><text id=\"1\">{}</text></binding></visual>{audio}</toast>",
        escape_xml(alert)
    ))
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    #[test]
    fn test_alert_builds_toast() {
        let payload = build("uri", &Notification::alert("Tom & Jerry"));
        assert_eq!(payload.wns_type(), "wns/toast");
        assert_eq!(
            payload.body(),
            "<toast><visual><binding template=\"ToastText01\"><text id=\"1\">Tom &amp; Jerry</text></binding></visual></toast>"
        );
    }

    #[test]
    fn test_silent_message_builds_raw() {
        let mut extra = Map::new();
        extra.insert("refresh".to_string(), json!(1));
        let notification = Notification {
            extra,
            ..Default::default()
        };

        let payload = build("uri", &notification);
        assert_eq!(payload, WnsPayload::Raw("{\"refresh\":1}".to_string()));
        assert_eq!(payload.content_type(), "application/octet-stream");
    }
}
