use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use validator::Validate;

use crate::errors::ServiceError;

/// Consumption priority derived from days to expiry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum UrgencyLevel {
    Critical,
    High,
    Medium,
    Low,
}

impl UrgencyLevel {
    /// Critical and High draws carry an extra "use immediately" warning.
    pub fn is_pressing(self) -> bool {
        matches!(self, UrgencyLevel::Critical | UrgencyLevel::High)
    }

    /// Parses a user-supplied filter string.
    pub fn parse_filter(value: &str) -> Result<Self, ServiceError> {
        value.trim().parse().map_err(|_| {
            ServiceError::ValidationError(format!(
                "Invalid urgency level '{}': expected one of CRITICAL, HIGH, MEDIUM, LOW",
                value
            ))
        })
    }

    /// Handling guidance shown on a picking line.
    pub fn picking_note(self) -> &'static str {
        match self {
            UrgencyLevel::Critical => "URGENT: Use immediately - expires today/tomorrow",
            UrgencyLevel::High => "Priority: Use within 3 days",
            UrgencyLevel::Medium => "Standard: Use within a week",
            UrgencyLevel::Low => "Normal: Good shelf life remaining",
        }
    }
}

/// Inclusive upper bounds, in whole days to expiry, of each tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct UrgencyThresholds {
    #[serde(default = "default_critical_days")]
    pub critical_days: i64,
    #[serde(default = "default_high_days")]
    pub high_days: i64,
    #[serde(default = "default_medium_days")]
    pub medium_days: i64,
}

impl Default for UrgencyThresholds {
    fn default() -> Self {
        Self {
            critical_days: default_critical_days(),
            high_days: default_high_days(),
            medium_days: default_medium_days(),
        }
    }
}

fn default_critical_days() -> i64 {
    1
}
fn default_high_days() -> i64 {
    3
}
fn default_medium_days() -> i64 {
    7
}

/// Whole days from `now` to `expiry`, truncated toward zero and negative once past.
pub fn days_until_expiry(expiry: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expiry - now).num_days()
}

pub fn classify_urgency(
    expiry: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    thresholds: &UrgencyThresholds,
) -> UrgencyLevel {
    let Some(expiry) = expiry else {
        return UrgencyLevel::Medium;
    };

    let days = days_until_expiry(expiry, now);
    if days <= thresholds.critical_days {
        UrgencyLevel::Critical
    } else if days <= thresholds.high_days {
        UrgencyLevel::High
    } else if days <= thresholds.medium_days {
        UrgencyLevel::Medium
    } else {
        UrgencyLevel::Low
    }
}
