//! Shared value types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of an anomaly or drift finding.
///
/// Ordered so that `Severity::High > Severity::Medium > Severity::Low >
/// Severity::None`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Nothing to report
    #[default]
    None,
    /// Worth watching
    Low,
    /// Needs attention
    Medium,
    /// Needs attention now
    High,
}

impl Severity {
    /// String form used in logs and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Whether this severity represents a finding
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::Low > Severity::None);
    }

    #[test]
    fn test_severity_roundtrip_str() {
        for sev in [Severity::None, Severity::Low, Severity::Medium, Severity::High] {
            assert_eq!(sev.as_str().parse::<Severity>().unwrap(), sev);
        }
        assert!("critical".parse::<Severity>().is_err());
    }

    #[test]
    fn test_severity_serde() {
        let json = serde_json::to_string(&Severity::Medium).unwrap();
        assert_eq!(json, "\"medium\"");
    }
}
