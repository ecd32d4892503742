/*!
 * # Metrics Module
 *
 * Prometheus counters for the allocation and freshness engine, registered in the default
 * registry. [`gather_text`] renders everything registered so far in the Prometheus text
 * exposition format.
 */

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_int_counter_vec, CounterVec, Encoder, IntCounterVec,
    TextEncoder,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

lazy_static! {
    pub static ref PICKS: IntCounterVec = register_int_counter_vec!(
        "kitchen_fifo_picks_total",
        "Picking recommendations by outcome",
        &["outcome"]
    )
    .expect("metric can be registered");
    pub static ref ALLOCATED_QUANTITY: CounterVec = register_counter_vec!(
        "kitchen_fifo_allocated_quantity_total",
        "Quantity drawn from batches",
        &["unit"]
    )
    .expect("metric can be registered");
    pub static ref PREDICTOR_OUTCOMES: IntCounterVec = register_int_counter_vec!(
        "kitchen_fifo_predictor_outcomes_total",
        "Shelf-life estimates by source and fallback reason",
        &["outcome"]
    )
    .expect("metric can be registered");
    pub static ref SWEEP_STATUS_CHANGES: IntCounterVec = register_int_counter_vec!(
        "kitchen_fifo_sweep_status_changes_total",
        "Freshness status transitions observed by the sweep",
        &["to_status"]
    )
    .expect("metric can be registered");
}

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Failed to export metrics: {0}")]
    ExportError(String),
}

pub fn record_pick(outcome: &str) {
    PICKS.with_label_values(&[outcome]).inc();
}

pub fn record_allocated(quantity: Decimal, unit: &str) {
    if let Some(amount) = quantity.to_f64().filter(|q| *q > 0.0) {
        ALLOCATED_QUANTITY.with_label_values(&[unit]).inc_by(amount);
    }
}

pub fn record_predictor_outcome(outcome: &str) {
    PREDICTOR_OUTCOMES.with_label_values(&[outcome]).inc();
}

pub fn record_status_change(to_status: &str) {
    SWEEP_STATUS_CHANGES.with_label_values(&[to_status]).inc();
}

/// Renders the default registry in the Prometheus text format.
pub fn gather_text() -> Result<String, MetricsError> {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&families, &mut buffer)
        .map_err(|e| MetricsError::ExportError(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| MetricsError::ExportError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn recorded_counters_show_up_in_text_output() {
        record_pick("fulfilled");
        record_allocated(dec!(2.6), "kg");
        record_predictor_outcome("fallback_disabled");
        record_status_change("RED");

        let text = gather_text().unwrap();
        assert!(text.contains("kitchen_fifo_picks_total"));
        assert!(text.contains("kitchen_fifo_allocated_quantity_total"));
        assert!(text.contains("outcome=\"fallback_disabled\""));
        assert!(text.contains("to_status=\"RED\""));
    }

    #[test]
    fn fractional_draws_are_counted() {
        let counter = ALLOCATED_QUANTITY.with_label_values(&["ons"]);
        let before = counter.get();
        record_allocated(dec!(0.4), "ons");
        record_allocated(dec!(0.35), "ons");
        assert!((counter.get() - before - 0.75).abs() < 1e-9);
    }
}
