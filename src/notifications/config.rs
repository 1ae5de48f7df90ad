use std::path::PathBuf;

use crate::{
    devices::entities::GatewayKind,
    settings::{ApnsAuthMode, ApnsSettings, GcmSettings, WnsSettings},
};

use super::{error::NotificationError, translator::ErrorTranslator};

pub const DEFAULT_GCM_POST_URL: &str = "https://fcm.googleapis.com/fcm/send";
pub const DEFAULT_GCM_MAX_RECIPIENTS: usize = 1000;
pub const DEFAULT_WNS_ACCESS_TOKEN_URL: &str = "https://login.live.com/accesstoken.srf";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApnsAuth {
    Certificate {
        certificate: PathBuf,
    },
    Token {
        team_id: String,
        bundle_id: String,
        key_id: String,
        key_path: PathBuf,
    },
}

/// Validated APNS configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApnsConfig {
    pub auth: ApnsAuth,
    pub use_sandbox: bool,
    pub use_alternative_port: bool,
    pub topic: Option<String>,
}

impl ApnsConfig {
    pub fn from_settings(
        settings: &ApnsSettings,
        development: bool,
    ) -> Result<Self, NotificationError> {
        let auth = match settings.auth {
            ApnsAuthMode::Certificate => ApnsAuth::Certificate {
                certificate: required(&settings.certificate, "apns.certificate")?.into(),
            },
            ApnsAuthMode::Token => ApnsAuth::Token {
                team_id: required(&settings.team_id, "apns.team_id")?,
                bundle_id: required(&settings.bundle_id, "apns.bundle_id")?,
                key_id: required(&settings.key_id, "apns.key_id")?,
                key_path: required(&settings.key_path, "apns.key_path")?.into(),
            },
        };

        Ok(Self {
            auth,
            use_sandbox: settings.use_sandbox.unwrap_or(development),
            use_alternative_port: settings.use_alternative_port,
            topic: settings.topic.clone().filter(|topic| !topic.is_empty()),
        })
    }

    pub fn host(&self) -> &'static str {
        if self.use_sandbox {
            "api.sandbox.push.apple.com"
        } else {
            "api.push.apple.com"
        }
    }

    pub fn port(&self) -> u16 {
        if self.use_alternative_port { 2197 } else { 443 }
    }

    /// Topic sent with each notification. Token auth falls back to the bundle id.
    pub fn topic(&self) -> Option<&str> {
        match (&self.topic, &self.auth) {
            (Some(topic), _) => Some(topic),
            (None, ApnsAuth::Token { bundle_id, .. }) => Some(bundle_id),
            (None, ApnsAuth::Certificate { .. }) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcmConfig {
    pub api_key: String,
    pub post_url: String,
    pub max_recipients: usize,
}

impl GcmConfig {
    pub fn from_settings(settings: &GcmSettings) -> Result<Self, NotificationError> {
        let max_recipients = settings
            .max_recipients
            .unwrap_or(DEFAULT_GCM_MAX_RECIPIENTS);
        if max_recipients == 0 {
            return Err(NotificationError::Configuration(
                "gcm.max_recipients must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            api_key: required(&settings.api_key, "gcm.api_key")?,
            post_url: settings
                .post_url
                .clone()
                .unwrap_or_else(|| DEFAULT_GCM_POST_URL.to_string()),
            max_recipients,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WnsConfig {
    pub package_security_id: String,
    pub secret_key: String,
    pub access_token_url: String,
}

impl WnsConfig {
    pub fn from_settings(settings: &WnsSettings) -> Result<Self, NotificationError> {
        Ok(Self {
            package_security_id: required(
                &settings.package_security_id,
                "wns.package_security_id",
            )?,
            secret_key: required(&settings.secret_key, "wns.secret_key")?,
            access_token_url: DEFAULT_WNS_ACCESS_TOKEN_URL.to_string(),
        })
    }
}

/// Builds the translator, applying any `permanent_reasons` overrides.
pub fn error_translator(
    apns: Option<&ApnsSettings>,
    gcm: Option<&GcmSettings>,
    wns: Option<&WnsSettings>,
) -> ErrorTranslator {
    let overrides = [
        (GatewayKind::Apns, apns.and_then(|s| s.permanent_reasons.clone())),
        (GatewayKind::Gcm, gcm.and_then(|s| s.permanent_reasons.clone())),
        (GatewayKind::Wns, wns.and_then(|s| s.permanent_reasons.clone())),
    ];

    overrides
        .into_iter()
        .fold(ErrorTranslator::default(), |translator, (gateway, reasons)| {
            match reasons {
                Some(reasons) => translator.with_permanent_reasons(gateway, reasons),
                None => translator,
            }
        })
}

fn required(value: &Option<String>, name: &str) -> Result<String, NotificationError> {
    match value.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(NotificationError::Configuration(format!(
            "You need to set {}",
            name
        ))),
    }
}
