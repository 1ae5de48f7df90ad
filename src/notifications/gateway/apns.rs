use async_trait::async_trait;
use futures::future::join_all;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use tracing::{debug, instrument, warn};

use super::{DeliveryParams, DeliveryPath, PushTransport, TransportSession};
use crate::{
    devices::entities::GatewayKind,
    notifications::{
        config::{ApnsAuth, ApnsConfig},
        entities::{DeliveryOutcome, Outcomes},
        error::{GatewayFailure, NotificationError},
        payload::{GatewayPayload, apns::ApnsPayload},
    },
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Device tokens are hex strings and end up in the request path.
pub fn validate_device_token(token: &str) -> Result<(), GatewayFailure> {
    if token.is_empty() || !token.bytes().all(|byte| byte.is_ascii_hexdigit()) {
        return Err(GatewayFailure::with_detail(
            "BadDeviceToken",
            "device token must be a hex string",
        ));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct ApnsClaims {
    iss: String,
    iat: i64,
}

#[derive(Debug, Deserialize)]
struct ApnsErrorBody {
    reason: String,
}

/// APNS (Apple Push Notification Service) transport over HTTP/2, using
/// either a client certificate or a signed provider token.
pub struct ApnsTransport {
    config: ApnsConfig,
}

impl ApnsTransport {
    pub fn new(config: ApnsConfig) -> Self {
        Self { config }
    }

    fn connection_error(&self, message: impl Into<String>) -> NotificationError {
        NotificationError::Connection {
            gateway: GatewayKind::Apns,
            message: message.into(),
        }
    }

    async fn certificate_client(&self, certificate: PathBuf) -> Result<Client, NotificationError> {
        let pem = tokio::fs::read(&certificate).await.map_err(|err| {
            self.connection_error(format!(
                "failed to read certificate {}: {}",
                certificate.display(),
                err
            ))
        })?;
        let identity = reqwest::Identity::from_pem(&pem)
            .map_err(|err| self.connection_error(format!("invalid certificate: {}", err)))?;

        Client::builder()
            .use_rustls_tls()
            .identity(identity)
            .http2_prior_knowledge()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| self.connection_error(err.to_string()))
    }

    async fn provider_token(
        &self,
        team_id: &str,
        key_id: &str,
        key_path: &PathBuf,
    ) -> Result<String, NotificationError> {
        let key_pem = tokio::fs::read(key_path).await.map_err(|err| {
            self.connection_error(format!(
                "failed to read signing key {}: {}",
                key_path.display(),
                err
            ))
        })?;
        let encoding_key = EncodingKey::from_ec_pem(&key_pem)
            .map_err(|err| self.connection_error(format!("invalid signing key: {}", err)))?;

        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(key_id.to_string());
        let claims = ApnsClaims {
            iss: team_id.to_string(),
            iat: chrono::Utc::now().timestamp(),
        };

        jsonwebtoken::encode(&header, &claims, &encoding_key)
            .map_err(|err| self.connection_error(format!("failed to sign token: {}", err)))
    }
}

#[async_trait]
impl PushTransport for ApnsTransport {
    fn gateway(&self) -> GatewayKind {
        GatewayKind::Apns
    }

    fn delivery_path(&self) -> DeliveryPath {
        match self.config.auth {
            ApnsAuth::Certificate { .. } => DeliveryPath::Reconciled,
            ApnsAuth::Token { .. } => DeliveryPath::Direct,
        }
    }

    #[instrument(skip_all, fields(gateway = "apns"))]
    async fn connect(
        &self,
        certificate: Option<PathBuf>,
    ) -> Result<Box<dyn TransportSession>, NotificationError> {
        let (client, authorization) = match &self.config.auth {
            ApnsAuth::Certificate {
                certificate: configured,
            } => {
                let certificate = certificate.unwrap_or_else(|| configured.clone());
                (self.certificate_client(certificate).await?, None)
            }
            ApnsAuth::Token {
                team_id,
                key_id,
                key_path,
                ..
            } => {
                if certificate.is_some() {
                    warn!("Ignoring certificate override, APNS is using token authentication");
                }
                let jwt = self.provider_token(team_id, key_id, key_path).await?;
                let client = Client::builder()
                    .http2_prior_knowledge()
                    .timeout(REQUEST_TIMEOUT)
                    .build()
                    .map_err(|err| self.connection_error(err.to_string()))?;
                (client, Some(format!("bearer {}", jwt)))
            }
        };

        debug!(host = self.config.host(), port = self.config.port(), "APNS session opened");

        Ok(Box::new(ApnsSession {
            client,
            authorization,
            base_url: format!(
                "https://{}:{}/3/device/",
                self.config.host(),
                self.config.port()
            ),
            topic: self.config.topic().map(str::to_string),
        }))
    }
}

struct ApnsSession {
    client: Client,
    authorization: Option<String>,
    base_url: String,
    topic: Option<String>,
}

impl ApnsSession {
    async fn deliver(
        &self,
        recipient: &str,
        payload: &ApnsPayload,
        params: &DeliveryParams,
    ) -> Result<Option<String>, GatewayFailure> {
        validate_device_token(recipient)?;
        let body = payload.to_bytes()?;

        let push_type = if payload.aps.alert.is_none() && payload.aps.content_available.is_some() {
            "background"
        } else {
            "alert"
        };

        let mut request = self
            .client
            .post(format!("{}{}", self.base_url, recipient))
            .header("content-type", "application/json")
            .header("apns-push-type", push_type)
            .header("apns-expiration", params.expiration.to_string());

        if let Some(authorization) = &self.authorization {
            request = request.header("authorization", authorization);
        }
        if let Some(topic) = &self.topic {
            request = request.header("apns-topic", topic);
        }
        if let Some(priority) = params.priority.and_then(|p| p.apns()) {
            request = request.header("apns-priority", priority.header_value());
        }
        if let Some(collapse_id) = &params.collapse_id {
            request = request.header("apns-collapse-id", collapse_id);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|err| GatewayFailure::with_detail("RequestFailed", err.to_string()))?;

        let status = response.status();
        let apns_id = response
            .headers()
            .get("apns-id")
            .and_then(|value| value.to_str().ok())
            .map(String::from);

        if status.is_success() {
            return Ok(apns_id);
        }

        let body = response.text().await.unwrap_or_default();
        Err(failure_from_response(status, &body))
    }
}

#[async_trait]
impl TransportSession for ApnsSession {
    #[instrument(skip_all, fields(gateway = "apns", recipient = %recipient))]
    async fn send_one(
        &self,
        recipient: &str,
        payload: &GatewayPayload,
        params: &DeliveryParams,
    ) -> Result<Option<String>, GatewayFailure> {
        let GatewayPayload::Apns(payload) = payload else {
            return Err(GatewayFailure::new("PayloadMismatch"));
        };

        self.deliver(recipient, payload, params).await
    }

    #[instrument(skip_all, fields(gateway = "apns", count = batch.len()))]
    async fn send_batch(
        &self,
        batch: Vec<(String, GatewayPayload)>,
        params: &DeliveryParams,
    ) -> Outcomes {
        let deliveries = batch.iter().map(|(recipient, payload)| async move {
            let result = self.send_one(recipient, payload, params).await;
            let outcome = match result {
                Ok(_) => DeliveryOutcome::Success,
                Err(failure) => DeliveryOutcome::Failure(failure.reason),
            };
            (recipient.clone(), outcome)
        });

        join_all(deliveries).await.into_iter().collect()
    }
}

/// Extracts the native reason from an APNS error response.
fn failure_from_response(status: StatusCode, body: &str) -> GatewayFailure {
    let detail = format!("status {}", status.as_u16());
    match serde_json::from_str::<ApnsErrorBody>(body) {
        Ok(error) => GatewayFailure::with_detail(error.reason, detail),
        Err(_) => GatewayFailure::with_detail(format!("Status{}", status.as_u16()), detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{
        entities::Notification,
        payload,
        priority::{ApnsPriority, Priority},
    };
    use crate::settings::{ApnsAuthMode, ApnsSettings};
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{any, header, method, path},
    };

    const TOKEN: &str = "a1b2c3d4";

    fn session(server: &MockServer) -> ApnsSession {
        ApnsSession {
            client: Client::new(),
            authorization: Some("bearer provider-jwt".to_string()),
            base_url: format!("{}/3/device/", server.uri()),
            topic: Some("com.example.app".to_string()),
        }
    }

    fn alert() -> GatewayPayload {
        payload::build(GatewayKind::Apns, TOKEN, &Notification::alert("Hello"))
    }

    fn settings(auth: ApnsAuthMode) -> ApnsSettings {
        ApnsSettings {
            auth,
            certificate: Some("/nonexistent/apns.pem".to_string()),
            use_sandbox: Some(true),
            use_alternative_port: false,
            topic: Some("com.example.app".to_string()),
            team_id: Some("TEAM".to_string()),
            bundle_id: Some("com.example.app".to_string()),
            key_id: Some("KEY".to_string()),
            key_path: Some("/nonexistent/AuthKey.p8".to_string()),
            permanent_reasons: None,
        }
    }

    #[test]
    fn test_device_token_must_be_hex() {
        let token = "00fc13adff785122b4ad28809a3420982341241421348097878e577c991de8f0";
        assert!(validate_device_token(token).is_ok());
        assert!(validate_device_token("").is_err());
        assert_eq!(
            validate_device_token("../../other/path").unwrap_err().reason,
            "BadDeviceToken"
        );
    }

    #[tokio::test]
    async fn test_request_carries_delivery_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/3/device/{}", TOKEN)))
            .and(header("authorization", "bearer provider-jwt"))
            .and(header("apns-topic", "com.example.app"))
            .and(header("apns-push-type", "alert"))
            .and(header("apns-expiration", "1700000000"))
            .and(header("apns-priority", "5"))
            .and(header("apns-collapse-id", "thread-7"))
            .respond_with(ResponseTemplate::new(200).insert_header("apns-id", "apns-id-1"))
            .expect(1)
            .mount(&server)
            .await;

        let params = DeliveryParams {
            expiration: 1_700_000_000,
            priority: Some(Priority::Apns(ApnsPriority::Delayed)),
            collapse_id: Some("thread-7".to_string()),
        };
        let apns_id = session(&server)
            .send_one(TOKEN, &alert(), &params)
            .await
            .unwrap();

        assert_eq!(apns_id.as_deref(), Some("apns-id-1"));
    }

    #[tokio::test]
    async fn test_error_body_reason_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(410)
                    .set_body_json(serde_json::json!({ "reason": "Unregistered", "timestamp": 1 })),
            )
            .mount(&server)
            .await;

        let params = DeliveryParams {
            expiration: 1_700_000_000,
            priority: None,
            collapse_id: None,
        };
        let outcomes = session(&server)
            .send_batch(vec![(TOKEN.to_string(), alert())], &params)
            .await;

        assert_eq!(
            outcomes[TOKEN],
            DeliveryOutcome::Failure("Unregistered".to_string())
        );
    }

    #[tokio::test]
    async fn test_malformed_token_never_reaches_the_gateway() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let params = DeliveryParams {
            expiration: 1_700_000_000,
            priority: None,
            collapse_id: None,
        };
        let result = session(&server)
            .send_one("token/../../other", &alert(), &params)
            .await;

        assert_eq!(result.unwrap_err().reason, "BadDeviceToken");
    }

    #[test]
    fn test_failure_reason_from_body() {
        let failure = failure_from_response(
            StatusCode::GONE,
            r#"{"reason":"Unregistered","timestamp":1700000000000}"#,
        );
        assert_eq!(failure.reason, "Unregistered");
        assert_eq!(failure.detail.as_deref(), Some("status 410"));
    }

    #[test]
    fn test_failure_without_body_uses_status() {
        let failure = failure_from_response(StatusCode::SERVICE_UNAVAILABLE, "");
        assert_eq!(failure.reason, "Status503");
    }

    #[test]
    fn test_delivery_path_follows_auth_mode() {
        let certificate =
            ApnsConfig::from_settings(&settings(ApnsAuthMode::Certificate), true).unwrap();
        let token = ApnsConfig::from_settings(&settings(ApnsAuthMode::Token), true).unwrap();

        assert_eq!(
            ApnsTransport::new(certificate).delivery_path(),
            DeliveryPath::Reconciled
        );
        assert_eq!(
            ApnsTransport::new(token).delivery_path(),
            DeliveryPath::Direct
        );
    }

    #[tokio::test]
    async fn test_missing_certificate_fails_to_connect() {
        let config = ApnsConfig::from_settings(&settings(ApnsAuthMode::Certificate), true).unwrap();
        let result = ApnsTransport::new(config).connect(None).await;

        assert!(matches!(
            result,
            Err(NotificationError::Connection {
                gateway: GatewayKind::Apns,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_missing_signing_key_fails_to_connect() {
        let config = ApnsConfig::from_settings(&settings(ApnsAuthMode::Token), true).unwrap();
        let result = ApnsTransport::new(config).connect(None).await;

        assert!(matches!(result, Err(NotificationError::Connection { .. })));
    }
}
