use crate::devices::entities::GatewayKind;

use super::error::NotificationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApnsPriority {
    Immediate,
    Delayed,
}

impl ApnsPriority {
    /// Value of the `apns-priority` header
    pub fn header_value(&self) -> &'static str {
        match self {
            ApnsPriority::Immediate => "10",
            ApnsPriority::Delayed => "5",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcmPriority {
    Normal,
    High,
}

impl GcmPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            GcmPriority::Normal => "normal",
            GcmPriority::High => "high",
        }
    }
}

/// `X-WNS-Priority` levels, 1 being the most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WnsPriority {
    High,
    Medium,
    Low,
    VeryLow,
}

impl WnsPriority {
    pub fn header_value(&self) -> &'static str {
        match self {
            WnsPriority::High => "1",
            WnsPriority::Medium => "2",
            WnsPriority::Low => "3",
            WnsPriority::VeryLow => "4",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Apns(ApnsPriority),
    Gcm(GcmPriority),
    Wns(WnsPriority),
}

impl Priority {
    /// Parses a caller supplied priority into the gateway's priority values.
    pub fn parse(gateway: GatewayKind, raw: &str) -> Result<Self, NotificationError> {
        let normalized = raw.trim().to_ascii_lowercase();
        let parsed = match gateway {
            GatewayKind::Apns => match normalized.as_str() {
                "10" | "immediate" => Some(Priority::Apns(ApnsPriority::Immediate)),
                "5" | "delayed" => Some(Priority::Apns(ApnsPriority::Delayed)),
                _ => None,
            },
            GatewayKind::Gcm => match normalized.as_str() {
                "normal" => Some(Priority::Gcm(GcmPriority::Normal)),
                "high" => Some(Priority::Gcm(GcmPriority::High)),
                _ => None,
            },
            GatewayKind::Wns => match normalized.as_str() {
                "1" | "high" => Some(Priority::Wns(WnsPriority::High)),
                "2" | "medium" => Some(Priority::Wns(WnsPriority::Medium)),
                "3" | "low" => Some(Priority::Wns(WnsPriority::Low)),
                "4" | "very-low" | "verylow" => Some(Priority::Wns(WnsPriority::VeryLow)),
                _ => None,
            },
        };

        parsed.ok_or_else(|| NotificationError::UnsupportedPriority {
            gateway,
            priority: raw.to_string(),
        })
    }

    pub fn apns(&self) -> Option<ApnsPriority> {
        match self {
            Priority::Apns(priority) => Some(*priority),
            _ => None,
        }
    }

    pub fn gcm(&self) -> Option<GcmPriority> {
        match self {
            Priority::Gcm(priority) => Some(*priority),
            _ => None,
        }
    }

    pub fn wns(&self) -> Option<WnsPriority> {
        match self {
            Priority::Wns(priority) => Some(*priority),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_apns_priorities() {
        assert_eq!(
            Priority::parse(GatewayKind::Apns, "10").unwrap(),
            Priority::Apns(ApnsPriority::Immediate)
        );
        assert_eq!(
            Priority::parse(GatewayKind::Apns, "5").unwrap(),
            Priority::Apns(ApnsPriority::Delayed)
        );
    }

    #[test]
    fn test_parse_rejects_unknown_priority() {
        let result = Priority::parse(GatewayKind::Apns, "urgent-but-unknown");
        assert!(matches!(
            result,
            Err(NotificationError::UnsupportedPriority { gateway: GatewayKind::Apns, .. })
        ));
    }

    #[test]
    fn test_priority_values_are_gateway_specific() {
        assert!(Priority::parse(GatewayKind::Gcm, "high").is_ok());
        assert!(Priority::parse(GatewayKind::Apns, "high").is_err());
        assert!(Priority::parse(GatewayKind::Gcm, "10").is_err());
        assert_eq!(
            Priority::parse(GatewayKind::Wns, "3").unwrap().wns(),
            Some(WnsPriority::Low)
        );
    }
}
