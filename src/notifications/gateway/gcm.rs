use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, instrument};

use super::{DeliveryParams, DeliveryPath, PushTransport, TransportSession};
use crate::{
    devices::entities::GatewayKind,
    notifications::{
        config::GcmConfig,
        entities::{DeliveryOutcome, Outcomes},
        error::{GatewayFailure, NotificationError},
        payload::{GatewayPayload, gcm::GcmPayload},
    },
};

/// Longest time to live GCM accepts: 4 weeks.
const MAX_TIME_TO_LIVE: i64 = 2_419_200;

#[derive(Debug, Serialize)]
struct GcmRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    registration_ids: Option<&'a [String]>,
    #[serde(flatten)]
    payload: &'a GcmPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<&'static str>,
    time_to_live: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    collapse_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct GcmResponse {
    #[serde(default)]
    results: Vec<GcmResult>,
}

#[derive(Debug, Deserialize)]
struct GcmResult {
    message_id: Option<String>,
    registration_id: Option<String>,
    error: Option<String>,
}

/// Google Cloud Messaging / FCM legacy HTTP transport.
pub struct GcmTransport {
    config: GcmConfig,
    client: Client,
}

impl GcmTransport {
    pub fn new(config: GcmConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl PushTransport for GcmTransport {
    fn gateway(&self) -> GatewayKind {
        GatewayKind::Gcm
    }

    fn delivery_path(&self) -> DeliveryPath {
        DeliveryPath::Reconciled
    }

    async fn connect(
        &self,
        _certificate: Option<PathBuf>,
    ) -> Result<Box<dyn TransportSession>, NotificationError> {
        // The HTTP API authenticates every request with the API key.
        Ok(Box::new(GcmSession {
            client: self.client.clone(),
            config: self.config.clone(),
        }))
    }
}

struct GcmSession {
    client: Client,
    config: GcmConfig,
}

impl GcmSession {
    /// Posts one request and returns one result per addressed recipient.
    async fn post(
        &self,
        recipients: &[String],
        payload: &GcmPayload,
        params: &DeliveryParams,
    ) -> Result<Vec<GcmResult>, GatewayFailure> {
        let request = GcmRequest {
            to: None,
            registration_ids: Some(recipients),
            payload,
            priority: params.priority.and_then(|p| p.gcm()).map(|p| p.as_str()),
            time_to_live: params.time_to_live().min(MAX_TIME_TO_LIVE),
            collapse_key: params.collapse_id.as_deref(),
        };
        let request = if recipients.len() == 1 {
            GcmRequest {
                to: Some(recipients[0].as_str()),
                registration_ids: None,
                ..request
            }
        } else {
            request
        };

        let response = self
            .client
            .post(&self.config.post_url)
            .header("authorization", format!("key={}", self.config.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|err| GatewayFailure::with_detail("RequestFailed", err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failure_from_status(status));
        }

        let body: GcmResponse = response
            .json()
            .await
            .map_err(|err| GatewayFailure::with_detail("InvalidResponse", err.to_string()))?;

        if body.results.len() != recipients.len() {
            return Err(GatewayFailure::with_detail(
                "InvalidResponse",
                format!(
                    "expected {} results, got {}",
                    recipients.len(),
                    body.results.len()
                ),
            ));
        }

        for (recipient, result) in recipients.iter().zip(&body.results) {
            if let Some(canonical) = &result.registration_id {
                info!(%recipient, %canonical, "GCM reported a canonical registration id");
            }
        }

        Ok(body.results)
    }
}

#[async_trait]
impl TransportSession for GcmSession {
    #[instrument(skip_all, fields(gateway = "gcm", recipient = %recipient))]
    async fn send_one(
        &self,
        recipient: &str,
        payload: &GatewayPayload,
        params: &DeliveryParams,
    ) -> Result<Option<String>, GatewayFailure> {
        let GatewayPayload::Gcm(payload) = payload else {
            return Err(GatewayFailure::new("PayloadMismatch"));
        };

        let mut results = self
            .post(&[recipient.to_string()], payload, params)
            .await?;

        let result = results.remove(0);
        match result.error {
            Some(error) => Err(GatewayFailure::new(error)),
            None => Ok(result.message_id),
        }
    }

    #[instrument(skip_all, fields(gateway = "gcm", count = batch.len()))]
    async fn send_batch(
        &self,
        batch: Vec<(String, GatewayPayload)>,
        params: &DeliveryParams,
    ) -> Outcomes {
        let mut outcomes = Outcomes::new();
        let mut groups: Vec<(GcmPayload, Vec<String>)> = Vec::new();

        for (recipient, payload) in batch {
            match payload {
                GatewayPayload::Gcm(payload) => add_to_group(&mut groups, recipient, payload),
                _ => {
                    outcomes.insert(
                        recipient,
                        DeliveryOutcome::Failure("PayloadMismatch".to_string()),
                    );
                }
            }
        }

        for (payload, recipients) in &groups {
            for chunk in recipients.chunks(self.config.max_recipients) {
                match self.post(chunk, payload, params).await {
                    Ok(results) => {
                        for (recipient, result) in chunk.iter().zip(results) {
                            let outcome = match result.error {
                                Some(error) => DeliveryOutcome::Failure(error),
                                None => DeliveryOutcome::Success,
                            };
                            outcomes.insert(recipient.clone(), outcome);
                        }
                    }
                    Err(failure) => {
                        for recipient in chunk {
                            outcomes.insert(
                                recipient.clone(),
                                DeliveryOutcome::Failure(failure.reason.clone()),
                            );
                        }
                    }
                }
            }
        }

        outcomes
    }
}

/// Recipients sharing an identical payload can be addressed by one request.
fn add_to_group(groups: &mut Vec<(GcmPayload, Vec<String>)>, recipient: String, payload: GcmPayload) {
    match groups.iter_mut().find(|(existing, _)| *existing == payload) {
        Some((_, recipients)) => recipients.push(recipient),
        None => groups.push((payload, vec![recipient])),
    }
}

fn failure_from_status(status: StatusCode) -> GatewayFailure {
    let reason = match status {
        StatusCode::BAD_REQUEST => "InvalidJson".to_string(),
        StatusCode::UNAUTHORIZED => "AuthenticationError".to_string(),
        status if status.is_server_error() => "Unavailable".to_string(),
        status => format!("Status{}", status.as_u16()),
    };
    GatewayFailure::with_detail(reason, format!("status {}", status.as_u16()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{entities::Notification, payload};
    use serde_json::{Map, json};
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, header, method, path},
    };

    async fn session(server: &MockServer, max_recipients: usize) -> Box<dyn TransportSession> {
        GcmTransport::new(GcmConfig {
            api_key: "secret".to_string(),
            post_url: format!("{}/fcm/send", server.uri()),
            max_recipients,
        })
        .connect(None)
        .await
        .unwrap()
    }

    fn params() -> DeliveryParams {
        DeliveryParams {
            expiration: chrono::Utc::now().timestamp() + 60,
            priority: None,
            collapse_id: None,
        }
    }

    fn message(recipient: &str) -> (String, GatewayPayload) {
        (
            recipient.to_string(),
            payload::build(GatewayKind::Gcm, recipient, &Notification::alert("hi")),
        )
    }

    #[tokio::test]
    async fn test_batch_is_chunked_and_results_follow_their_ids() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/fcm/send"))
            .and(header("authorization", "key=secret"))
            .and(body_partial_json(json!({ "registration_ids": ["a", "b"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{ "message_id": "0:1" }, { "error": "NotRegistered" }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/fcm/send"))
            .and(body_partial_json(json!({ "to": "c" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{ "error": "Unavailable" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let outcomes = session(&server, 2)
            .await
            .send_batch(vec![message("a"), message("b"), message("c")], &params())
            .await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes["a"], DeliveryOutcome::Success);
        assert_eq!(
            outcomes["b"],
            DeliveryOutcome::Failure("NotRegistered".to_string())
        );
        assert_eq!(
            outcomes["c"],
            DeliveryOutcome::Failure("Unavailable".to_string())
        );
    }

    #[tokio::test]
    async fn test_send_one_addresses_a_single_recipient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "to": "a", "notification": { "body": "hi" } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{ "message_id": "0:42" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (recipient, payload) = message("a");
        let message_id = session(&server, 1000)
            .await
            .send_one(&recipient, &payload, &params())
            .await
            .unwrap();

        assert_eq!(message_id.as_deref(), Some("0:42"));
    }

    #[tokio::test]
    async fn test_rejected_request_fails_every_recipient_of_the_chunk() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let outcomes = session(&server, 1000)
            .await
            .send_batch(vec![message("a"), message("b")], &params())
            .await;

        assert!(outcomes.values().all(|outcome| {
            *outcome == DeliveryOutcome::Failure("AuthenticationError".to_string())
        }));
    }

    fn payload_with(key: &str) -> GcmPayload {
        let mut data = Map::new();
        data.insert(key.to_string(), json!(1));
        GcmPayload {
            data,
            ..Default::default()
        }
    }

    #[test]
    fn test_identical_payloads_share_a_group() {
        let mut groups = Vec::new();
        add_to_group(&mut groups, "a".to_string(), payload_with("x"));
        add_to_group(&mut groups, "b".to_string(), payload_with("y"));
        add_to_group(&mut groups, "c".to_string(), payload_with("x"));

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].1, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(groups[1].1, vec!["b".to_string()]);
    }

    #[test]
    fn test_request_shape() {
        let payload = payload_with("x");
        let recipients = vec!["a".to_string(), "b".to_string()];
        let request = GcmRequest {
            to: None,
            registration_ids: Some(&recipients),
            payload: &payload,
            priority: Some("high"),
            time_to_live: 60,
            collapse_key: None,
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "registration_ids": ["a", "b"],
                "data": { "x": 1 },
                "priority": "high",
                "time_to_live": 60
            })
        );
    }

    #[test]
    fn test_failure_from_status() {
        assert_eq!(
            failure_from_status(StatusCode::UNAUTHORIZED).reason,
            "AuthenticationError"
        );
        assert_eq!(
            failure_from_status(StatusCode::BAD_GATEWAY).reason,
            "Unavailable"
        );
        assert_eq!(
            failure_from_status(StatusCode::IM_A_TEAPOT).reason,
            "Status418"
        );
    }

    #[test]
    fn test_results_parse() {
        let body: GcmResponse = serde_json::from_str(
            r#"{"multicast_id":1,"success":1,"failure":1,"canonical_ids":0,
                "results":[{"message_id":"0:1"},{"error":"NotRegistered"}]}"#,
        )
        .unwrap();

        assert_eq!(body.results[0].message_id.as_deref(), Some("0:1"));
        assert_eq!(body.results[1].error.as_deref(), Some("NotRegistered"));
    }
}
