use thiserror::Error;

use crate::devices::entities::GatewayKind;

use super::translator::FailureReason;

/// Raw failure reported by a gateway for one recipient, before translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayFailure {
    /// Native reason, e.g. APNS "Unregistered" or GCM "NotRegistered"
    pub reason: String,
    pub detail: Option<String>,
}

impl GatewayFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            detail: None,
        }
    }

    pub fn with_detail(reason: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            detail: Some(detail.into()),
        }
    }
}

impl std::fmt::Display for GatewayFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{} ({})", self.reason, detail),
            None => f.write_str(&self.reason),
        }
    }
}

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Improperly configured: {0}")]
    Configuration(String),

    #[error("Unsupported {gateway} priority: {priority}")]
    UnsupportedPriority {
        gateway: GatewayKind,
        priority: String,
    },

    #[error("Failed to connect to {gateway}: {message}")]
    Connection {
        gateway: GatewayKind,
        message: String,
    },

    /// Raised by transports when a single delivery is rejected.
    #[error("{gateway} rejected the notification: {failure}")]
    Delivery {
        gateway: GatewayKind,
        failure: GatewayFailure,
    },

    /// Raised by the delivery service after translating a rejected delivery.
    #[error("{gateway} server error: {reason}")]
    Server {
        gateway: GatewayKind,
        reason: FailureReason,
    },
}

impl NotificationError {
    /// Reason string shown to operators.
    pub fn status(&self) -> String {
        match self {
            NotificationError::Server { reason, .. } => reason.as_str().to_string(),
            NotificationError::Delivery { failure, .. } => failure.reason.clone(),
            other => other.to_string(),
        }
    }
}
