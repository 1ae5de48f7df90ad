use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, instrument};

use super::{DeliveryParams, DeliveryPath, PushTransport, TransportSession};
use crate::{
    devices::entities::GatewayKind,
    notifications::{
        config::WnsConfig,
        entities::{DeliveryOutcome, Outcomes},
        error::{GatewayFailure, NotificationError},
        payload::{GatewayPayload, wns::WnsPayload},
    },
};

const NOTIFY_SCOPE: &str = "notify.windows.com";
const CHANNEL_HOST_SUFFIX: &str = ".notify.windows.com";

/// Parses a channel URI, accepting only https URLs on a WNS host. The access
/// token is sent to this URL, so nothing else may be posted to.
pub fn validate_channel_uri(channel_uri: &str) -> Result<Url, GatewayFailure> {
    let url = Url::parse(channel_uri)
        .map_err(|err| GatewayFailure::with_detail("InvalidChannelUri", err.to_string()))?;

    let on_wns_host = url
        .host_str()
        .is_some_and(|host| host.ends_with(CHANNEL_HOST_SUFFIX));
    if url.scheme() != "https" || !on_wns_host {
        return Err(GatewayFailure::with_detail(
            "InvalidChannelUri",
            "channel must be an https URL on a notify.windows.com host",
        ));
    }

    Ok(url)
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
}

/// Windows Push Notification Services transport. The registration id of a
/// WNS device is its channel URI.
pub struct WnsTransport {
    config: WnsConfig,
    client: Client,
    channel_check: ChannelCheck,
}

type ChannelCheck = fn(&str) -> Result<Url, GatewayFailure>;

impl WnsTransport {
    pub fn new(config: WnsConfig) -> Self {
        Self {
            config,
            client: Client::new(),
            channel_check: validate_channel_uri,
        }
    }

    fn connection_error(&self, message: impl Into<String>) -> NotificationError {
        NotificationError::Connection {
            gateway: GatewayKind::Wns,
            message: message.into(),
        }
    }
}

#[async_trait]
impl PushTransport for WnsTransport {
    fn gateway(&self) -> GatewayKind {
        GatewayKind::Wns
    }

    fn delivery_path(&self) -> DeliveryPath {
        DeliveryPath::Reconciled
    }

    #[instrument(skip_all, fields(gateway = "wns"))]
    async fn connect(
        &self,
        _certificate: Option<PathBuf>,
    ) -> Result<Box<dyn TransportSession>, NotificationError> {
        let response = self
            .client
            .post(&self.config.access_token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.package_security_id.as_str()),
                ("client_secret", self.config.secret_key.as_str()),
                ("scope", NOTIFY_SCOPE),
            ])
            .send()
            .await
            .map_err(|err| self.connection_error(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.connection_error(format!(
                "access token request failed with status {}",
                status.as_u16()
            )));
        }

        let token: AccessTokenResponse = response
            .json()
            .await
            .map_err(|err| self.connection_error(format!("invalid token response: {}", err)))?;

        debug!("WNS access token obtained");

        Ok(Box::new(WnsSession {
            client: self.client.clone(),
            access_token: token.access_token,
            channel_check: self.channel_check,
        }))
    }
}

struct WnsSession {
    client: Client,
    access_token: String,
    channel_check: ChannelCheck,
}

impl WnsSession {
    async fn deliver(
        &self,
        channel_uri: &str,
        payload: &WnsPayload,
        params: &DeliveryParams,
    ) -> Result<Option<String>, GatewayFailure> {
        let channel = (self.channel_check)(channel_uri)?;

        let mut request = self
            .client
            .post(channel)
            .bearer_auth(&self.access_token)
            .header("content-type", payload.content_type())
            .header("x-wns-type", payload.wns_type())
            .header("x-wns-ttl", params.time_to_live().to_string());

        if let Some(priority) = params.priority.and_then(|p| p.wns()) {
            request = request.header("x-wns-priority", priority.header_value());
        }
        if let (WnsPayload::Toast(_), Some(tag)) = (payload, &params.collapse_id) {
            request = request.header("x-wns-tag", tag);
        }

        let response = request
            .body(payload.body().to_string())
            .send()
            .await
            .map_err(|err| GatewayFailure::with_detail("RequestFailed", err.to_string()))?;

        let status = response.status();
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(String::from)
        };

        if status.is_success() {
            return Ok(header("x-wns-msg-id"));
        }

        let reason = reason_for_status(status);
        Err(match header("x-wns-error-description") {
            Some(description) => GatewayFailure::with_detail(reason, description),
            None => GatewayFailure::new(reason),
        })
    }
}

#[async_trait]
impl TransportSession for WnsSession {
    #[instrument(skip_all, fields(gateway = "wns"))]
    async fn send_one(
        &self,
        recipient: &str,
        payload: &GatewayPayload,
        params: &DeliveryParams,
    ) -> Result<Option<String>, GatewayFailure> {
        let GatewayPayload::Wns(payload) = payload else {
            return Err(GatewayFailure::new("PayloadMismatch"));
        };

        self.deliver(recipient, payload, params).await
    }

    #[instrument(skip_all, fields(gateway = "wns", count = batch.len()))]
    async fn send_batch(
        &self,
        batch: Vec<(String, GatewayPayload)>,
        params: &DeliveryParams,
    ) -> Outcomes {
        let deliveries = batch.iter().map(|(recipient, payload)| async move {
            let outcome = match self.send_one(recipient, payload, params).await {
                Ok(_) => DeliveryOutcome::Success,
                Err(failure) => DeliveryOutcome::Failure(failure.reason),
            };
            (recipient.clone(), outcome)
        });

        join_all(deliveries).await.into_iter().collect()
    }
}

/// Native WNS reason for an HTTP response status.
fn reason_for_status(status: StatusCode) -> String {
    match status {
        StatusCode::BAD_REQUEST => "BadRequest".to_string(),
        StatusCode::UNAUTHORIZED => "Unauthorized".to_string(),
        StatusCode::FORBIDDEN => "Forbidden".to_string(),
        StatusCode::NOT_FOUND => "NotFound".to_string(),
        StatusCode::METHOD_NOT_ALLOWED => "MethodNotAllowed".to_string(),
        StatusCode::NOT_ACCEPTABLE => "Throttled".to_string(),
        StatusCode::GONE => "Gone".to_string(),
        StatusCode::PAYLOAD_TOO_LARGE => "EntityTooLarge".to_string(),
        StatusCode::INTERNAL_SERVER_ERROR => "InternalServerError".to_string(),
        StatusCode::SERVICE_UNAVAILABLE => "ServiceUnavailable".to_string(),
        status => format!("Status{}", status.as_u16()),
    }
}
