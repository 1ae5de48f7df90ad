use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::devices::entities::GatewayKind;

/// Normalized failure reason. Permanent reasons mean the registration id
/// will never accept deliveries again and the device gets deactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "lowercase")]
pub enum FailureReason {
    Permanent(String),
    Transient(String),
}

impl FailureReason {
    pub fn is_permanent(&self) -> bool {
        matches!(self, FailureReason::Permanent(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            FailureReason::Permanent(reason) | FailureReason::Transient(reason) => reason,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Native reasons treated as permanent when nothing else is configured.
pub fn default_permanent_reasons(gateway: GatewayKind) -> &'static [&'static str] {
    match gateway {
        GatewayKind::Apns => &["Unregistered"],
        GatewayKind::Gcm => &["NotRegistered", "InvalidRegistration"],
        GatewayKind::Wns => &["NotFound", "Gone", "InvalidChannelUri"],
    }
}

/// Maps native gateway reasons onto [`FailureReason`].
#[derive(Debug, Clone)]
pub struct ErrorTranslator {
    permanent: HashMap<GatewayKind, HashSet<String>>,
}

impl Default for ErrorTranslator {
    fn default() -> Self {
        let permanent = GatewayKind::ALL
            .iter()
            .map(|gateway| {
                let reasons = default_permanent_reasons(*gateway)
                    .iter()
                    .map(|reason| reason.to_string())
                    .collect();
                (*gateway, reasons)
            })
            .collect();

        Self { permanent }
    }
}

impl ErrorTranslator {
    /// Replaces the permanent reason set of a gateway.
    pub fn with_permanent_reasons<I, S>(mut self, gateway: GatewayKind, reasons: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permanent
            .insert(gateway, reasons.into_iter().map(Into::into).collect());
        self
    }

    pub fn translate(&self, gateway: GatewayKind, native_reason: &str) -> FailureReason {
        let permanent = self
            .permanent
            .get(&gateway)
            .is_some_and(|reasons| reasons.contains(native_reason));

        if permanent {
            FailureReason::Permanent(native_reason.to_string())
        } else {
            FailureReason::Transient(native_reason.to_string())
        }
    }

    pub fn is_permanent(&self, gateway: GatewayKind, native_reason: &str) -> bool {
        self.translate(gateway, native_reason).is_permanent()
    }
}
