use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use super::{database::DeviceDatabaseError, entities::GatewayKind};
use crate::notifications::error::NotificationError;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("No {0} gateway is configured")]
    GatewayUnavailable(GatewayKind),

    #[error("Database operation failed: {0}")]
    DatabaseError(String),

    #[error(transparent)]
    Notification(#[from] NotificationError),
}

impl From<DeviceDatabaseError> for DeviceError {
    fn from(err: DeviceDatabaseError) -> Self {
        DeviceError::DatabaseError(err.to_string())
    }
}

impl IntoResponse for DeviceError {
    fn into_response(self) -> Response {
        error!("{}", self);
        let status = match &self {
            DeviceError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            DeviceError::NotFound(_) => StatusCode::NOT_FOUND,
            DeviceError::GatewayUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            DeviceError::Notification(NotificationError::UnsupportedPriority { .. }) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_priority_is_a_bad_request() {
        let err = DeviceError::from(NotificationError::UnsupportedPriority {
            gateway: GatewayKind::Apns,
            priority: "urgent".to_string(),
        });

        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            DeviceError::GatewayUnavailable(GatewayKind::Wns)
                .into_response()
                .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            DeviceError::from(DeviceDatabaseError::OperationFailed)
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
