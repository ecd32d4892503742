//! Scores how closely the stored layout follows first-expired-first-out.
//!
//! Within each ingredient, batches are walked in entry order. A pair is a violation when
//! the earlier-stored batch expires strictly after the one stored next to it; pairs where
//! either side has no expiry count as compliant.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::batch::Batch;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceViolation {
    pub earlier_batch_id: Uuid,
    pub earlier_batch_code: String,
    pub later_batch_id: Uuid,
    pub later_batch_code: String,
    pub ingredient_name: String,
    /// Weight of the earlier-stored batch
    pub weight_at_risk: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    /// 0..=100, two decimals
    pub score: f64,
    pub compliant_pairs: usize,
    pub violating_pairs: usize,
    pub weight_at_risk: Decimal,
    pub violations: Vec<ComplianceViolation>,
}

impl ComplianceReport {
    fn perfect() -> Self {
        Self {
            score: 100.0,
            compliant_pairs: 0,
            violating_pairs: 0,
            weight_at_risk: Decimal::ZERO,
            violations: Vec::new(),
        }
    }

    pub fn recommendation(&self) -> &'static str {
        if self.score < 70.0 {
            "FIFO compliance is poor. Review storage organization and staff training."
        } else if self.score < 85.0 {
            "FIFO compliance is moderate. Place new deliveries behind older stock."
        } else {
            "FIFO compliance is good. Keep the current storage practice."
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComplianceScorer {
    min_batches: usize,
}

impl Default for ComplianceScorer {
    fn default() -> Self {
        Self { min_batches: 2 }
    }
}

impl ComplianceScorer {
    pub fn new(min_batches: usize) -> Self {
        Self { min_batches }
    }

    pub fn score(&self, batches: &[Batch]) -> ComplianceReport {
        if batches.len() < self.min_batches {
            return ComplianceReport::perfect();
        }

        let mut groups: BTreeMap<&str, Vec<&Batch>> = BTreeMap::new();
        for batch in batches {
            groups
                .entry(batch.ingredient_name.as_str())
                .or_default()
                .push(batch);
        }

        let mut compliant_pairs = 0usize;
        let mut violations = Vec::new();

        for (ingredient, mut group) in groups {
            group.sort_by(|a, b| a.entry_date.cmp(&b.entry_date).then_with(|| a.id.cmp(&b.id)));

            for pair in group.windows(2) {
                let (earlier, later) = (pair[0], pair[1]);
                match (earlier.expiry_date, later.expiry_date) {
                    (Some(e), Some(l)) if e > l => violations.push(ComplianceViolation {
                        earlier_batch_id: earlier.id,
                        earlier_batch_code: earlier.batch_code.clone(),
                        later_batch_id: later.id,
                        later_batch_code: later.batch_code.clone(),
                        ingredient_name: ingredient.to_string(),
                        weight_at_risk: earlier.weight,
                    }),
                    _ => compliant_pairs += 1,
                }
            }
        }

        let violating_pairs = violations.len();
        let total_pairs = compliant_pairs + violating_pairs;
        if total_pairs == 0 {
            return ComplianceReport::perfect();
        }

        let raw = compliant_pairs as f64 / total_pairs as f64 * 100.0;
        let score = (raw * 100.0).round() / 100.0;

        ComplianceReport {
            score,
            compliant_pairs,
            violating_pairs,
            weight_at_risk: violations.iter().map(|v| v.weight_at_risk).sum(),
            violations,
        }
    }
}
