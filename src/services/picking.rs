//! Greedy FIFO picking.
//!
//! [`PickingAllocator::pick`] walks the consumption order of one ingredient and draws from
//! each batch until the requested quantity is covered. It never mutates the snapshot;
//! applying the draws is the caller's job.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::batch::{Batch, StorageClass};
use crate::services::fifo_ordering::fifo_order;
use crate::services::urgency::{classify_urgency, UrgencyLevel, UrgencyThresholds};

const USE_ALL_NOTE: &str = "Use all available stock";

/// One line of a picking plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationDraw {
    pub batch_id: Uuid,
    pub batch_code: String,
    pub quantity: Decimal,
    pub unit: String,
    pub urgency: UrgencyLevel,
    /// 1-based position in the plan
    pub sequence: usize,
    pub storage: StorageClass,
    pub expiry_date: Option<DateTime<Utc>>,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PickResult {
    /// The draws add up to exactly the requested quantity.
    Fulfilled {
        draws: Vec<AllocationDraw>,
        total_available: Decimal,
        warnings: Vec<String>,
    },
    /// Every usable batch is drawn in full and `shortage` is still missing.
    Shortage {
        draws: Vec<AllocationDraw>,
        total_available: Decimal,
        shortage: Decimal,
        unit: String,
        warnings: Vec<String>,
    },
    /// Nothing to draw from.
    Unavailable {
        ingredient_name: String,
        shortage: Decimal,
        unit: String,
        warnings: Vec<String>,
    },
}

impl PickResult {
    pub fn draws(&self) -> &[AllocationDraw] {
        match self {
            PickResult::Fulfilled { draws, .. } | PickResult::Shortage { draws, .. } => draws,
            PickResult::Unavailable { .. } => &[],
        }
    }

    pub fn into_draws(self) -> Vec<AllocationDraw> {
        match self {
            PickResult::Fulfilled { draws, .. } | PickResult::Shortage { draws, .. } => draws,
            PickResult::Unavailable { .. } => Vec::new(),
        }
    }

    pub fn warnings(&self) -> &[String] {
        match self {
            PickResult::Fulfilled { warnings, .. }
            | PickResult::Shortage { warnings, .. }
            | PickResult::Unavailable { warnings, .. } => warnings,
        }
    }

    pub fn total_available(&self) -> Decimal {
        match self {
            PickResult::Fulfilled { total_available, .. }
            | PickResult::Shortage { total_available, .. } => *total_available,
            PickResult::Unavailable { .. } => Decimal::ZERO,
        }
    }

    pub fn shortage(&self) -> Decimal {
        match self {
            PickResult::Fulfilled { .. } => Decimal::ZERO,
            PickResult::Shortage { shortage, .. } | PickResult::Unavailable { shortage, .. } => {
                *shortage
            }
        }
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(self, PickResult::Fulfilled { .. })
    }

    /// Label used for metrics and logs.
    pub fn outcome(&self) -> &'static str {
        match self {
            PickResult::Fulfilled { .. } => "fulfilled",
            PickResult::Shortage { .. } => "shortage",
            PickResult::Unavailable { .. } => "unavailable",
        }
    }

    /// Message shown to the person picking.
    pub fn message(&self) -> String {
        match self {
            PickResult::Fulfilled { draws, .. } => {
                format!("Picking plan ready: draw from {} batch(es) in order", draws.len())
            }
            PickResult::Shortage { shortage, unit, .. } => {
                format!("Insufficient stock. Need {} {} more", shortage.normalize(), unit)
            }
            PickResult::Unavailable { ingredient_name, .. } => {
                format!("No stock available for {}", ingredient_name)
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PickingAllocator {
    urgency: UrgencyThresholds,
}

impl PickingAllocator {
    pub fn new(urgency: UrgencyThresholds) -> Self {
        Self { urgency }
    }

    /// Plans how much to draw from each batch of `ingredient` to cover `requested`.
    ///
    /// `requested` is expected to be positive; callers reject anything else before
    /// planning. Active batches with zero weight are skipped.
    pub fn pick(
        &self,
        snapshot: &[Batch],
        ingredient: &str,
        requested: Decimal,
        unit: &str,
        now: DateTime<Utc>,
    ) -> PickResult {
        let ordered: Vec<&Batch> = fifo_order(snapshot, ingredient, None)
            .into_iter()
            .filter(|b| b.weight > Decimal::ZERO)
            .collect();

        if ordered.is_empty() {
            return PickResult::Unavailable {
                ingredient_name: ingredient.to_string(),
                shortage: requested,
                unit: unit.to_string(),
                warnings: vec![format!("No stock available for {}", ingredient)],
            };
        }

        let total_available: Decimal = ordered.iter().map(|b| b.weight).sum();
        let mut warnings = Vec::new();

        if total_available < requested {
            let shortage = requested - total_available;
            let draws = ordered
                .iter()
                .enumerate()
                .map(|(i, batch)| {
                    let urgency = classify_urgency(batch.expiry_date, now, &self.urgency);
                    if urgency.is_pressing() {
                        warnings.push(expiring_warning(batch));
                    }
                    draw(batch, batch.weight, urgency, i + 1, USE_ALL_NOTE)
                })
                .collect();
            warnings.push(format!(
                "Stock shortage: {} {} missing",
                shortage.normalize(),
                unit
            ));
            return PickResult::Shortage {
                draws,
                total_available,
                shortage,
                unit: unit.to_string(),
                warnings,
            };
        }

        let mut remaining = requested;
        let mut draws = Vec::new();
        for batch in ordered {
            if remaining <= Decimal::ZERO {
                break;
            }
            let quantity = remaining.min(batch.weight);
            let urgency = classify_urgency(batch.expiry_date, now, &self.urgency);
            if urgency.is_pressing() {
                warnings.push(expiring_warning(batch));
            }
            draws.push(draw(batch, quantity, urgency, draws.len() + 1, urgency.picking_note()));
            remaining -= quantity;
        }

        PickResult::Fulfilled {
            draws,
            total_available,
            warnings,
        }
    }
}

fn expiring_warning(batch: &Batch) -> String {
    format!("Batch {} expires soon - use immediately", batch.batch_code)
}

fn draw(
    batch: &Batch,
    quantity: Decimal,
    urgency: UrgencyLevel,
    sequence: usize,
    note: &str,
) -> AllocationDraw {
    AllocationDraw {
        batch_id: batch.id,
        batch_code: batch.batch_code.clone(),
        quantity,
        unit: batch.unit.clone(),
        urgency,
        sequence,
        storage: batch.storage,
        expiry_date: batch.expiry_date,
        note: format!("{} | Location: {}", note, batch.storage),
    }
}
