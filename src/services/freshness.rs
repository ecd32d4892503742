//! Freshness classification.
//!
//! The remaining fraction of a batch's life is computed in whole days, truncating toward
//! zero, and bucketed into [`FreshnessStatus`] by two configurable thresholds.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use validator::Validate;

use crate::models::batch::FreshnessStatus;

/// Bucket boundaries on the remaining-life fraction.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct FreshnessThresholds {
    /// Fractions strictly above this are Green
    #[serde(default = "default_green")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub green: f64,

    /// Fractions strictly above this (and not Green) are Yellow
    #[serde(default = "default_yellow")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub yellow: f64,
}

impl Default for FreshnessThresholds {
    fn default() -> Self {
        Self {
            green: default_green(),
            yellow: default_yellow(),
        }
    }
}

fn default_green() -> f64 {
    0.7
}
fn default_yellow() -> f64 {
    0.3
}

/// Classifies a batch with a known expiry.
pub fn classify_freshness(
    entry: DateTime<Utc>,
    expiry: DateTime<Utc>,
    now: DateTime<Utc>,
    thresholds: &FreshnessThresholds,
) -> FreshnessStatus {
    if expiry <= now {
        return FreshnessStatus::Red;
    }

    let total_days = (expiry - entry).num_days();
    if total_days <= 0 {
        return FreshnessStatus::Red;
    }
    let remaining_days = (expiry - now).num_days();

    let fraction = remaining_days as f64 / total_days as f64;
    if fraction > thresholds.green {
        FreshnessStatus::Green
    } else if fraction > thresholds.yellow {
        FreshnessStatus::Yellow
    } else {
        FreshnessStatus::Red
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn ten_day_batch_walks_through_every_status() {
        let th = FreshnessThresholds::default();
        let entry = t0();
        let expiry = entry + Duration::days(10);

        // 10/10 remaining
        assert_eq!(classify_freshness(entry, expiry, entry, &th), FreshnessStatus::Green);
        // 8/10
        assert_eq!(
            classify_freshness(entry, expiry, entry + Duration::days(2), &th),
            FreshnessStatus::Green
        );
        // 7/10 is not strictly above 0.7
        assert_eq!(
            classify_freshness(entry, expiry, entry + Duration::days(3), &th),
            FreshnessStatus::Yellow
        );
        // 4/10
        assert_eq!(
            classify_freshness(entry, expiry, entry + Duration::days(6), &th),
            FreshnessStatus::Yellow
        );
        // 3/10 is not strictly above 0.3
        assert_eq!(
            classify_freshness(entry, expiry, entry + Duration::days(7), &th),
            FreshnessStatus::Red
        );
    }

    #[test]
    fn partial_days_truncate() {
        let th = FreshnessThresholds::default();
        let entry = t0();
        let expiry = entry + Duration::days(10);
        // 7 days 23 hours remain, which counts as 7
        let now = entry + Duration::days(2) + Duration::hours(1);
        assert_eq!(classify_freshness(entry, expiry, now, &th), FreshnessStatus::Yellow);
    }

    #[test]
    fn expired_or_degenerate_is_red() {
        let th = FreshnessThresholds::default();
        let entry = t0();
        assert_eq!(
            classify_freshness(entry, entry + Duration::days(5), entry + Duration::days(5), &th),
            FreshnessStatus::Red
        );
        // less than a full day of total life
        assert_eq!(
            classify_freshness(entry, entry + Duration::hours(20), entry, &th),
            FreshnessStatus::Red
        );
    }
}
