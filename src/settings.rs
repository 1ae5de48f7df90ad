use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct WebserverSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApnsAuthMode {
    Certificate,
    Token,
}

/// Raw APNS settings. Which fields are required depends on `auth` and is
/// checked by `ApnsConfig::from_settings`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApnsSettings {
    pub auth: ApnsAuthMode,
    /// PEM file holding both the client certificate and its private key
    pub certificate: Option<String>,
    pub use_sandbox: Option<bool>,
    #[serde(default)]
    pub use_alternative_port: bool,
    pub topic: Option<String>,
    pub team_id: Option<String>,
    pub bundle_id: Option<String>,
    pub key_id: Option<String>,
    /// PKCS#8 signing key downloaded from the developer account
    pub key_path: Option<String>,
    pub permanent_reasons: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GcmSettings {
    pub api_key: Option<String>,
    pub post_url: Option<String>,
    pub max_recipients: Option<usize>,
    pub permanent_reasons: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WnsSettings {
    pub package_security_id: Option<String>,
    pub secret_key: Option<String>,
    pub permanent_reasons: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySettings {
    /// Base URL of an OTLP/HTTP collector, metrics are not exported without it
    pub otlp_endpoint: Option<String>,
    #[serde(default = "default_export_interval_secs")]
    pub export_interval_secs: u64,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            export_interval_secs: default_export_interval_secs(),
        }
    }
}

fn default_export_interval_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type")]
#[serde(rename_all = "lowercase")]
pub enum DatabaseSettings {
    InMemory,
    Sqlite { path: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub development: bool,
    pub webserver: WebserverSettings,
    pub database: DatabaseSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
    pub apns: Option<ApnsSettings>,
    pub gcm: Option<GcmSettings>,
    pub wns: Option<WnsSettings>,
}

impl Settings {
    pub fn load() -> Result<Settings, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("settings"))
            .add_source(Environment::with_prefix("PUSH_DISPATCH").separator("__"))
            .build()?;

        settings.try_deserialize()
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Settings, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("PUSH_DISPATCH").separator("__"))
            .build()?;

        settings.try_deserialize()
    }
}
