use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;
use uuid::Uuid;

/// Vendor push gateway a device is registered with.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    Apns,
    Gcm,
    Wns,
}

impl GatewayKind {
    pub const ALL: [GatewayKind; 3] = [GatewayKind::Apns, GatewayKind::Gcm, GatewayKind::Wns];

    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayKind::Apns => "apns",
            GatewayKind::Gcm => "gcm",
            GatewayKind::Wns => "wns",
        }
    }
}

impl fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GatewayKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "apns" => Ok(GatewayKind::Apns),
            "gcm" | "fcm" => Ok(GatewayKind::Gcm),
            "wns" => Ok(GatewayKind::Wns),
            other => Err(format!("Unknown gateway kind: {}", other)),
        }
    }
}

/// A registered device. The registration id is unique per gateway kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: Uuid,
    pub gateway: GatewayKind,
    /// Opaque registration token issued by the gateway
    pub registration_id: String,
    pub name: Option<String>,
    /// Hardware or installation identifier reported by the app
    pub device_id: Option<String>,
    /// Owning user, if any
    pub user: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Device {
    pub fn new(gateway: GatewayKind, registration_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            gateway,
            registration_id: registration_id.into(),
            name: None,
            device_id: None,
            user: None,
            active: true,
            created_at: Utc::now(),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.gateway),
            None => write!(f, "{} {}", self.gateway, self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_kind_parses_aliases() {
        assert_eq!("APNS".parse::<GatewayKind>(), Ok(GatewayKind::Apns));
        assert_eq!("fcm".parse::<GatewayKind>(), Ok(GatewayKind::Gcm));
        assert_eq!("wns".parse::<GatewayKind>(), Ok(GatewayKind::Wns));
        assert!("mpns".parse::<GatewayKind>().is_err());
    }

    #[test]
    fn test_new_device_is_active() {
        let device = Device::new(GatewayKind::Gcm, "token");
        assert!(device.active);
        assert_eq!(device.registration_id, "token");
    }
}
