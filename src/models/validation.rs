use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

/// Finding is one validation result for a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub rule_id: String,
    pub device: String,
    pub message: String,
}

impl Finding {
    pub fn error(rule_id: &str, device: &str, message: impl Into<String>) -> Self {
        Finding {
            severity: Severity::Error,
            rule_id: rule_id.to_string(),
            device: device.to_string(),
            message: message.into(),
        }
    }

    pub fn warning(rule_id: &str, device: &str, message: impl Into<String>) -> Self {
        Finding {
            severity: Severity::Warning,
            rule_id: rule_id.to_string(),
            device: device.to_string(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}: {}", self.severity, self.device, self.rule_id, self.message)
    }
}
