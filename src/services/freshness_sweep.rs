//! Periodic re-classification of stored batches.
//!
//! [`FreshnessSweep::run`] is a plain function over a snapshot, so a scheduler and a test
//! drive it the same way. Device heartbeat bookkeeping lives in [`SweepState`], which the
//! caller owns and passes in.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};
use uuid::Uuid;

use crate::events::Event;
use crate::metrics;
use crate::models::batch::{Batch, FreshnessStatus};
use crate::services::freshness::{classify_freshness, FreshnessThresholds};

/// State carried between sweep runs.
#[derive(Debug, Default, Clone)]
pub struct SweepState {
    device_last_seen: HashMap<String, DateTime<Utc>>,
    offline_reported: HashSet<String>,
    last_run: Option<DateTime<Utc>>,
    runs: u64,
}

impl SweepState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the ingestion path whenever a device reports in.
    pub fn record_device_activity(&mut self, device_id: &str, at: DateTime<Utc>) {
        self.device_last_seen.insert(device_id.to_string(), at);
        self.offline_reported.remove(device_id);
    }

    pub fn last_seen(&self, device_id: &str) -> Option<DateTime<Utc>> {
        self.device_last_seen.get(device_id).copied()
    }

    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        self.last_run
    }

    pub fn runs(&self) -> u64 {
        self.runs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusChange {
    pub batch_id: Uuid,
    pub batch_code: String,
    pub ingredient_name: String,
    pub old_status: FreshnessStatus,
    pub new_status: FreshnessStatus,
}

#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub evaluated: usize,
    pub changes: Vec<StatusChange>,
    /// Batches whose status changed, with the new status applied
    pub updated: Vec<Batch>,
    pub events: Vec<Event>,
    pub swept_at: Option<DateTime<Utc>>,
}

impl SweepReport {
    /// Drops the changes and batch events of `skipped`. Device events stay.
    pub fn discard(&mut self, skipped: &HashSet<Uuid>) {
        if skipped.is_empty() {
            return;
        }
        self.changes.retain(|c| !skipped.contains(&c.batch_id));
        self.updated.retain(|b| !skipped.contains(&b.id));
        self.events
            .retain(|e| e.batch_id().map_or(true, |id| !skipped.contains(&id)));
    }
}

#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    /// Deactivated copies of the candidates
    pub deactivated: Vec<Batch>,
    pub events: Vec<Event>,
}

impl CleanupReport {
    pub fn discard(&mut self, skipped: &HashSet<Uuid>) {
        if skipped.is_empty() {
            return;
        }
        self.deactivated.retain(|b| !skipped.contains(&b.id));
        self.events
            .retain(|e| e.batch_id().map_or(true, |id| !skipped.contains(&id)));
    }
}

#[derive(Debug, Clone)]
pub struct FreshnessSweep {
    freshness: FreshnessThresholds,
    device_offline_after: Duration,
}

impl Default for FreshnessSweep {
    fn default() -> Self {
        Self::new(FreshnessThresholds::default(), Duration::minutes(5))
    }
}

impl FreshnessSweep {
    pub fn new(freshness: FreshnessThresholds, device_offline_after: Duration) -> Self {
        Self {
            freshness,
            device_offline_after,
        }
    }

    /// Re-classifies every active batch that has an expiry and reports devices that went
    /// quiet since the last run.
    pub fn run(&self, state: &mut SweepState, batches: &[Batch], now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport {
            swept_at: Some(now),
            ..SweepReport::default()
        };

        for batch in batches.iter().filter(|b| b.active) {
            let Some(expiry) = batch.expiry_date else {
                continue;
            };
            report.evaluated += 1;

            let new_status = classify_freshness(batch.entry_date, expiry, now, &self.freshness);
            if new_status == batch.freshness_status {
                continue;
            }

            debug!(
                batch_code = %batch.batch_code,
                from = %batch.freshness_status,
                to = %new_status,
                "freshness status moved"
            );
            metrics::record_status_change(new_status.as_ref());

            report.events.push(Event::FreshnessStatusChanged {
                batch_id: batch.id,
                batch_code: batch.batch_code.clone(),
                ingredient_name: batch.ingredient_name.clone(),
                old_status: batch.freshness_status,
                new_status,
            });
            if new_status == FreshnessStatus::Red {
                report.events.push(Event::ExpiryAlert {
                    batch_id: batch.id,
                    batch_code: batch.batch_code.clone(),
                    ingredient_name: batch.ingredient_name.clone(),
                    days_until_expiry: batch.days_until_expiry(now),
                });
            }

            report.changes.push(StatusChange {
                batch_id: batch.id,
                batch_code: batch.batch_code.clone(),
                ingredient_name: batch.ingredient_name.clone(),
                old_status: batch.freshness_status,
                new_status,
            });
            let mut updated = batch.clone();
            updated.freshness_status = new_status;
            report.updated.push(updated);
        }

        for (device_id, last_seen) in &state.device_last_seen {
            if now - *last_seen > self.device_offline_after
                && !state.offline_reported.contains(device_id)
            {
                report.events.push(Event::DeviceOffline {
                    device_id: device_id.clone(),
                    last_seen: *last_seen,
                });
            }
        }
        for event in &report.events {
            if let Event::DeviceOffline { device_id, .. } = event {
                state.offline_reported.insert(device_id.clone());
            }
        }

        state.last_run = Some(now);
        state.runs += 1;

        info!(
            evaluated = report.evaluated,
            changed = report.changes.len(),
            "freshness sweep finished"
        );
        report
    }

    /// Deactivates Red batches whose expiry has passed.
    pub fn cleanup_expired(&self, batches: &[Batch], now: DateTime<Utc>) -> CleanupReport {
        let mut report = CleanupReport::default();

        for batch in batches {
            let expired = batch.expiry_date.map_or(false, |expiry| expiry < now);
            if !(batch.active && batch.freshness_status == FreshnessStatus::Red && expired) {
                continue;
            }

            let mut deactivated = batch.clone();
            deactivated.active = false;
            report.events.push(Event::BatchExpiredCleanup {
                batch_id: batch.id,
                batch_code: batch.batch_code.clone(),
                ingredient_name: batch.ingredient_name.clone(),
            });
            report.deactivated.push(deactivated);
        }

        info!(deactivated = report.deactivated.len(), "expired batch cleanup finished");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::batch::{Category, StorageClass};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 6, 0, 0).unwrap()
    }

    fn batch(status: FreshnessStatus, expiry_days: Option<i64>) -> Batch {
        Batch {
            id: Uuid::new_v4(),
            batch_code: "BAY-20240701-RFG-001".to_string(),
            ingredient_name: "Bayam".to_string(),
            category: Category::Vegetable,
            weight: dec!(1),
            unit: "kg".to_string(),
            entry_date: t0(),
            expiry_date: expiry_days.map(|d| t0() + Duration::days(d)),
            freshness_status: status,
            active: true,
            storage: StorageClass::Refrigerator,
            source: None,
            notes: None,
        }
    }

    #[test]
    fn transition_to_red_emits_change_and_expiry_alert() {
        let sweep = FreshnessSweep::default();
        let mut state = SweepState::new();
        let batches = vec![batch(FreshnessStatus::Yellow, Some(10))];

        let report = sweep.run(&mut state, &batches, t0() + Duration::days(8));

        assert_eq!(report.changes.len(), 1);
        assert_eq!(report.changes[0].new_status, FreshnessStatus::Red);
        assert_eq!(report.updated[0].freshness_status, FreshnessStatus::Red);
        assert!(matches!(report.events[0], Event::FreshnessStatusChanged { .. }));
        assert!(matches!(
            report.events[1],
            Event::ExpiryAlert { days_until_expiry: Some(2), .. }
        ));
        assert_eq!(state.runs(), 1);
    }

    #[test]
    fn unchanged_and_expiryless_batches_are_quiet() {
        let sweep = FreshnessSweep::default();
        let mut state = SweepState::new();
        let batches = vec![
            batch(FreshnessStatus::Green, Some(10)),
            batch(FreshnessStatus::Yellow, None),
        ];

        let report = sweep.run(&mut state, &batches, t0());
        assert_eq!(report.evaluated, 1);
        assert!(report.changes.is_empty());
        assert!(report.events.is_empty());
    }

    #[test]
    fn quiet_devices_are_reported_once() {
        let sweep = FreshnessSweep::default();
        let mut state = SweepState::new();
        state.record_device_activity("fridge-sensor", t0());

        let first = sweep.run(&mut state, &[], t0() + Duration::minutes(6));
        assert_eq!(first.events.len(), 1);
        let second = sweep.run(&mut state, &[], t0() + Duration::minutes(12));
        assert!(second.events.is_empty());

        state.record_device_activity("fridge-sensor", t0() + Duration::minutes(13));
        let third = sweep.run(&mut state, &[], t0() + Duration::minutes(14));
        assert!(third.events.is_empty());
    }

    #[test]
    fn cleanup_only_touches_expired_red_batches() {
        let sweep = FreshnessSweep::default();
        let now = t0() + Duration::days(5);
        let batches = vec![
            batch(FreshnessStatus::Red, Some(3)),
            batch(FreshnessStatus::Red, Some(9)),
            batch(FreshnessStatus::Yellow, Some(3)),
        ];

        let report = sweep.cleanup_expired(&batches, now);
        assert_eq!(report.deactivated.len(), 1);
        assert!(!report.deactivated[0].active);
        assert_eq!(report.events.len(), 1);
    }

    #[test]
    fn discarded_batches_lose_their_events_but_devices_keep_theirs() {
        let sweep = FreshnessSweep::default();
        let mut state = SweepState::new();
        state.record_device_activity("freezer-sensor", t0());
        let kept = batch(FreshnessStatus::Yellow, Some(10));
        let skipped = batch(FreshnessStatus::Yellow, Some(10));

        let mut report = sweep.run(
            &mut state,
            &[kept.clone(), skipped.clone()],
            t0() + Duration::days(8),
        );
        assert_eq!(report.events.len(), 5);

        report.discard(&HashSet::from([skipped.id]));
        assert_eq!(report.changes.len(), 1);
        assert_eq!(report.updated[0].id, kept.id);
        assert_eq!(report.events.len(), 3);
        assert!(report
            .events
            .iter()
            .all(|e| e.batch_id() != Some(skipped.id)));
    }
}
