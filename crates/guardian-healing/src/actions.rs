//! Remediation actions and the issue-to-action policy table.

use crate::signal::HealthIssue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Remediation intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemediationAction {
    ScaleUp,
    IncreaseCacheTtl,
    AggressiveCache,
    ConservativeMode,
    RouteToFastModel,
    AlertTeam,
    NoAction,
}

impl RemediationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScaleUp => "scale_up",
            Self::IncreaseCacheTtl => "increase_cache_ttl",
            Self::AggressiveCache => "aggressive_cache",
            Self::ConservativeMode => "conservative_mode",
            Self::RouteToFastModel => "route_to_fast_model",
            Self::AlertTeam => "alert_team",
            Self::NoAction => "no_action",
        }
    }
}

impl fmt::Display for RemediationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered actions applied for an issue
pub fn actions_for(issue: HealthIssue) -> &'static [RemediationAction] {
    use RemediationAction::*;

    match issue {
        HealthIssue::HighErrorRate => &[ScaleUp, AlertTeam],
        HealthIssue::HighLatency => &[ScaleUp, IncreaseCacheTtl],
        HealthIssue::LowQuality => &[ConservativeMode, AlertTeam],
        HealthIssue::HighCost => &[RouteToFastModel, AggressiveCache],
        HealthIssue::LowCacheHitRate => &[IncreaseCacheTtl],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_table() {
        assert_eq!(
            actions_for(HealthIssue::HighErrorRate),
            &[RemediationAction::ScaleUp, RemediationAction::AlertTeam]
        );
        assert_eq!(
            actions_for(HealthIssue::HighCost),
            &[
                RemediationAction::RouteToFastModel,
                RemediationAction::AggressiveCache
            ]
        );
        assert_eq!(actions_for(HealthIssue::LowCacheHitRate).len(), 1);
    }

    #[test]
    fn test_table_never_yields_no_action() {
        let all = [
            HealthIssue::HighErrorRate,
            HealthIssue::HighLatency,
            HealthIssue::LowQuality,
            HealthIssue::HighCost,
            HealthIssue::LowCacheHitRate,
        ];
        for issue in all {
            assert!(!actions_for(issue).contains(&RemediationAction::NoAction));
        }
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&RemediationAction::IncreaseCacheTtl).unwrap(),
            "\"INCREASE_CACHE_TTL\""
        );
    }
}
