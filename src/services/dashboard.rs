//! Read-only priority views over a batch snapshot.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use strum::{AsRefStr, Display};
use uuid::Uuid;

use crate::models::batch::{Batch, FreshnessStatus, StorageClass};
use crate::services::compliance::ComplianceReport;
use crate::services::fifo_ordering::{fifo_order, fifo_order_all};
use crate::services::urgency::{classify_urgency, UrgencyLevel, UrgencyThresholds};

const TOP_ENTRIES: usize = 10;

const FRONT_POSITION_SHARE: f64 = 0.3;
const MIDDLE_POSITION_SHARE: f64 = 0.7;
const POOR_COMPLIANCE: f64 = 70.0;
const MODERATE_COMPLIANCE: f64 = 85.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriorityEntry {
    pub batch_id: Uuid,
    pub batch_code: String,
    pub ingredient_name: String,
    pub weight: Decimal,
    pub unit: String,
    pub urgency: UrgencyLevel,
    pub days_until_expiry: Option<i64>,
    pub freshness_status: FreshnessStatus,
    pub storage: StorageClass,
}

impl PriorityEntry {
    pub fn from_batch(batch: &Batch, now: DateTime<Utc>, thresholds: &UrgencyThresholds) -> Self {
        Self {
            batch_id: batch.id,
            batch_code: batch.batch_code.clone(),
            ingredient_name: batch.ingredient_name.clone(),
            weight: batch.weight,
            unit: batch.unit.clone(),
            urgency: classify_urgency(batch.expiry_date, now, thresholds),
            days_until_expiry: batch.days_until_expiry(now),
            freshness_status: batch.freshness_status,
            storage: batch.storage,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriorityStatistics {
    pub total_active: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub critical_pct: f64,
    pub high_pct: f64,
    pub medium_pct: f64,
    pub low_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriorityDashboard {
    pub generated_at: DateTime<Utc>,
    pub statistics: PriorityStatistics,
    pub top_critical: Vec<PriorityEntry>,
    pub top_high: Vec<PriorityEntry>,
    pub compliance: ComplianceReport,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FifoSummaryEntry {
    /// 1-based consumption rank
    pub rank: usize,
    pub batch_code: String,
    pub weight: Decimal,
    pub entry_date: DateTime<Utc>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub days_until_expiry: Option<i64>,
    pub urgency: UrgencyLevel,
    pub freshness_status: FreshnessStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FifoSummary {
    pub ingredient_name: String,
    pub batch_count: usize,
    pub total_weight: Decimal,
    pub unit: Option<String>,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
    pub batches: Vec<FifoSummaryEntry>,
}

/// Shelf zone a batch should sit in, front being the first reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ShelfPosition {
    Front,
    Middle,
    Back,
}

impl ShelfPosition {
    /// Zone for the 1-based `position` among `total` batches of one ingredient.
    pub fn for_position(position: usize, total: usize) -> Self {
        let position = position as f64;
        let total = total as f64;
        if position <= total * FRONT_POSITION_SHARE {
            ShelfPosition::Front
        } else if position <= total * MIDDLE_POSITION_SHARE {
            ShelfPosition::Middle
        } else {
            ShelfPosition::Back
        }
    }

    pub fn note(self) -> &'static str {
        match self {
            ShelfPosition::Front => "Front position - easy access for FIFO",
            ShelfPosition::Middle => "Middle position - moderate access",
            ShelfPosition::Back => "Back position - newest items",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Accessibility {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl Accessibility {
    /// Earlier positions score higher: `(total - position + 1) / total * 100`.
    pub fn for_position(position: usize, total: usize) -> Self {
        let score = (total + 1).saturating_sub(position) as f64 / total.max(1) as f64 * 100.0;
        if score >= 80.0 {
            Accessibility::Excellent
        } else if score >= 60.0 {
            Accessibility::Good
        } else if score >= 40.0 {
            Accessibility::Fair
        } else {
            Accessibility::Poor
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchPlacement {
    pub batch_code: String,
    /// 1-based, front to back
    pub recommended_position: usize,
    pub entry_date: DateTime<Utc>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub freshness_status: FreshnessStatus,
    pub weight: Decimal,
    pub unit: String,
    pub shelf_position: ShelfPosition,
    pub position_note: &'static str,
    pub accessibility: Accessibility,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngredientLayout {
    pub ingredient_name: String,
    pub placements: Vec<BatchPlacement>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageLayout {
    pub storage: StorageClass,
    pub ingredients: Vec<IngredientLayout>,
}

/// Overall FIFO health of the active stock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FifoAnalysis {
    pub total_batches: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    /// 0..=100, two decimals
    pub compliance_score: f64,
    pub recommendations: Vec<String>,
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 10_000.0).round() / 100.0
}

/// Active batches of one urgency tier, in consumption order.
pub fn batches_with_urgency(
    batches: &[Batch],
    level: UrgencyLevel,
    now: DateTime<Utc>,
    thresholds: &UrgencyThresholds,
) -> Vec<PriorityEntry> {
    fifo_order_all(batches)
        .into_iter()
        .map(|b| PriorityEntry::from_batch(b, now, thresholds))
        .filter(|entry| entry.urgency == level)
        .collect()
}

pub fn build_priority_dashboard(
    batches: &[Batch],
    compliance: ComplianceReport,
    now: DateTime<Utc>,
    thresholds: &UrgencyThresholds,
) -> PriorityDashboard {
    let entries: Vec<PriorityEntry> = fifo_order_all(batches)
        .into_iter()
        .map(|b| PriorityEntry::from_batch(b, now, thresholds))
        .collect();

    let count = |level: UrgencyLevel| entries.iter().filter(|e| e.urgency == level).count();
    let total = entries.len();
    let (critical, high, medium, low) = (
        count(UrgencyLevel::Critical),
        count(UrgencyLevel::High),
        count(UrgencyLevel::Medium),
        count(UrgencyLevel::Low),
    );
    let statistics = PriorityStatistics {
        total_active: total,
        critical,
        high,
        medium,
        low,
        critical_pct: percentage(critical, total),
        high_pct: percentage(high, total),
        medium_pct: percentage(medium, total),
        low_pct: percentage(low, total),
    };

    let top = |level: UrgencyLevel| -> Vec<PriorityEntry> {
        entries
            .iter()
            .filter(|e| e.urgency == level)
            .take(TOP_ENTRIES)
            .cloned()
            .collect()
    };

    let mut recommendations = Vec::new();
    if critical > 0 {
        recommendations.push(format!(
            "{} batch(es) expire today or tomorrow: use them first in today's menu",
            critical
        ));
    }
    if high > 0 {
        recommendations.push(format!(
            "{} batch(es) should be used within 3 days",
            high
        ));
    }
    recommendations.push(compliance.recommendation().to_string());
    if total > 0 && critical == 0 && high == 0 {
        recommendations.push("No batches need urgent attention".to_string());
    }

    PriorityDashboard {
        generated_at: now,
        statistics,
        top_critical: top(UrgencyLevel::Critical),
        top_high: top(UrgencyLevel::High),
        compliance,
        recommendations,
    }
}

/// Where each active batch should sit on its shelf. Batches are grouped by storage class
/// and ingredient, and placed front to back by entry date.
pub fn build_storage_layout(batches: &[Batch], storage: Option<StorageClass>) -> Vec<StorageLayout> {
    let mut grouped: BTreeMap<&'static str, (StorageClass, BTreeMap<&str, Vec<&Batch>>)> =
        BTreeMap::new();
    for batch in batches
        .iter()
        .filter(|b| b.active && storage.map_or(true, |s| b.storage == s))
    {
        grouped
            .entry(batch.storage.code())
            .or_insert_with(|| (batch.storage, BTreeMap::new()))
            .1
            .entry(batch.ingredient_name.as_str())
            .or_default()
            .push(batch);
    }

    grouped
        .into_values()
        .map(|(storage, by_ingredient)| StorageLayout {
            storage,
            ingredients: by_ingredient
                .into_iter()
                .map(|(name, mut shelf)| {
                    shelf.sort_by(|a, b| a.entry_date.cmp(&b.entry_date).then_with(|| a.id.cmp(&b.id)));
                    let total = shelf.len();
                    IngredientLayout {
                        ingredient_name: name.to_string(),
                        placements: shelf
                            .iter()
                            .enumerate()
                            .map(|(i, b)| {
                                let position = i + 1;
                                let shelf_position = ShelfPosition::for_position(position, total);
                                BatchPlacement {
                                    batch_code: b.batch_code.clone(),
                                    recommended_position: position,
                                    entry_date: b.entry_date,
                                    expiry_date: b.expiry_date,
                                    freshness_status: b.freshness_status,
                                    weight: b.weight,
                                    unit: b.unit.clone(),
                                    shelf_position,
                                    position_note: shelf_position.note(),
                                    accessibility: Accessibility::for_position(position, total),
                                }
                            })
                            .collect(),
                    }
                })
                .collect(),
        })
        .collect()
}

pub fn build_fifo_analysis(
    batches: &[Batch],
    compliance: &ComplianceReport,
    now: DateTime<Utc>,
    thresholds: &UrgencyThresholds,
) -> FifoAnalysis {
    let levels: Vec<UrgencyLevel> = fifo_order_all(batches)
        .into_iter()
        .map(|b| classify_urgency(b.expiry_date, now, thresholds))
        .collect();
    let count = |level: UrgencyLevel| levels.iter().filter(|l| **l == level).count();
    let (critical, high) = (count(UrgencyLevel::Critical), count(UrgencyLevel::High));

    let mut recommendations = Vec::new();
    if critical > 0 {
        recommendations.push(format!(
            "Immediate action required: {} batch(es) expire within 48 hours",
            critical
        ));
    }
    if high > 0 {
        recommendations.push(format!(
            "Plan usage: {} batch(es) need to be used within 3 days",
            high
        ));
    }
    let score = compliance.score;
    let rounded = score.round();
    recommendations.push(if score < POOR_COMPLIANCE {
        format!("Poor FIFO compliance ({}%). Reorganize storage to restore order", rounded)
    } else if score < MODERATE_COMPLIANCE {
        format!("Moderate FIFO compliance ({}%). Some improvements needed", rounded)
    } else {
        format!("Good FIFO compliance ({}%). Continue current practices", rounded)
    });

    FifoAnalysis {
        total_batches: levels.len(),
        critical,
        high,
        medium: count(UrgencyLevel::Medium),
        low: count(UrgencyLevel::Low),
        compliance_score: (score * 100.0).round() / 100.0,
        recommendations,
    }
}

pub fn build_fifo_summary(
    batches: &[Batch],
    ingredient: &str,
    now: DateTime<Utc>,
    thresholds: &UrgencyThresholds,
) -> FifoSummary {
    let ordered = fifo_order(batches, ingredient, None);

    FifoSummary {
        ingredient_name: ingredient.to_string(),
        batch_count: ordered.len(),
        total_weight: ordered.iter().map(|b| b.weight).sum(),
        unit: ordered.first().map(|b| b.unit.clone()),
        oldest_entry: ordered.iter().map(|b| b.entry_date).min(),
        newest_entry: ordered.iter().map(|b| b.entry_date).max(),
        batches: ordered
            .iter()
            .enumerate()
            .map(|(i, b)| FifoSummaryEntry {
                rank: i + 1,
                batch_code: b.batch_code.clone(),
                weight: b.weight,
                entry_date: b.entry_date,
                expiry_date: b.expiry_date,
                days_until_expiry: b.days_until_expiry(now),
                urgency: classify_urgency(b.expiry_date, now, thresholds),
                freshness_status: b.freshness_status,
            })
            .collect(),
    }
}
