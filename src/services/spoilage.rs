//! Expiry estimation for batches that arrive without an authoritative date.
//!
//! Estimation is a two-stage pipeline. The injected [`ShelfLifePredictor`] is tried first,
//! bounded by a timeout, at most one retry and a circuit breaker. Any failure falls through
//! to a static shelf-life table scaled by storage class. [`SpoilageEstimator::estimate`]
//! never fails.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};
use crate::config::PredictorConfig;
use crate::metrics;
use crate::ml::{FeatureCategory, PredictorError, ShelfLifePredictor, ShelfLifeRequest};
use crate::models::batch::{FreshnessStatus, StorageClass};
use crate::services::freshness::{classify_freshness, FreshnessThresholds};

const DEFAULT_SHELF_LIFE_DAYS: i64 = 7;
/// Longest shelf life a prediction may claim.
const MAX_PREDICTED_SHELF_LIFE_DAYS: f64 = 3_650.0;
const INTAKE_QUANTITY_FEATURE: f64 = 1.0;

/// Base shelf life in days at pantry temperature.
static SHELF_LIFE_DAYS: Lazy<HashMap<&'static str, i64>> = Lazy::new(|| {
    HashMap::from([
        ("bayam", 3),
        ("kangkung", 3),
        ("sawi", 5),
        ("tomat", 7),
        ("wortel", 14),
        ("kentang", 30),
        ("bawang merah", 30),
        ("pisang", 5),
        ("apel", 14),
        ("jeruk", 14),
        ("mangga", 7),
        ("pepaya", 5),
        ("semangka", 10),
        ("ayam", 2),
        ("daging sapi", 3),
        ("ikan", 1),
        ("telur", 21),
        ("tahu", 5),
        ("tempe", 3),
        // English names
        ("spinach", 3),
        ("tomato", 7),
        ("carrot", 14),
        ("potato", 30),
        ("shallot", 30),
        ("banana", 5),
        ("apple", 14),
        ("orange", 14),
        ("mango", 7),
        ("papaya", 5),
        ("watermelon", 10),
        ("chicken", 2),
        ("beef", 3),
        ("fish", 1),
        ("egg", 21),
        ("eggs", 21),
        ("tofu", 5),
        ("tempeh", 3),
    ])
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateSource {
    /// Printed by the supplier and entered at intake
    Supplied,
    Predicted,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpoilageEstimate {
    pub expiry_date: DateTime<Utc>,
    pub freshness_status: FreshnessStatus,
    pub estimated_days: i64,
    pub source: EstimateSource,
}

/// Health of the prediction path, for operators.
#[derive(Debug, Clone, Serialize)]
pub struct PredictorStatus {
    pub enabled: bool,
    pub configured: bool,
    pub endpoint: Option<String>,
    pub circuit_state: CircuitState,
}

/// Shelf life in days from the static table, scaled by storage and rounded to whole days.
pub fn fallback_shelf_life_days(ingredient_name: &str, storage: StorageClass) -> i64 {
    let key = ingredient_name.trim().to_lowercase();
    let base = SHELF_LIFE_DAYS
        .get(key.as_str())
        .copied()
        .unwrap_or(DEFAULT_SHELF_LIFE_DAYS);
    (base as f64 * storage.shelf_life_multiplier()).round() as i64
}

#[derive(Clone)]
pub struct SpoilageEstimator {
    predictor: Option<Arc<dyn ShelfLifePredictor>>,
    enabled: bool,
    timeout: Duration,
    max_retries: u32,
    freshness: FreshnessThresholds,
    breaker: CircuitBreaker,
}

impl SpoilageEstimator {
    pub fn new(
        predictor: Option<Arc<dyn ShelfLifePredictor>>,
        config: &PredictorConfig,
        freshness: FreshnessThresholds,
    ) -> Self {
        let breaker = CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: config.circuit_breaker_failure_threshold,
            timeout: config.circuit_breaker_timeout(),
            success_threshold: 1,
        });
        Self {
            predictor,
            enabled: config.enabled,
            timeout: config.timeout(),
            max_retries: config.max_retries.min(1),
            freshness,
            breaker,
        }
    }

    /// Estimator that always uses the static table.
    pub fn fallback_only(freshness: FreshnessThresholds) -> Self {
        Self::new(None, &PredictorConfig::default(), freshness)
    }

    pub async fn estimate(
        &self,
        ingredient_name: &str,
        storage: StorageClass,
        entry: DateTime<Utc>,
        temperature: Option<f64>,
    ) -> SpoilageEstimate {
        self.estimate_at(ingredient_name, storage, entry, temperature, Utc::now())
            .await
    }

    /// Same as [`estimate`](Self::estimate), classifying freshness as of `now`.
    pub async fn estimate_at(
        &self,
        ingredient_name: &str,
        storage: StorageClass,
        entry: DateTime<Utc>,
        temperature: Option<f64>,
        now: DateTime<Utc>,
    ) -> SpoilageEstimate {
        if let Some(days) = self.predicted_days(ingredient_name, storage, temperature).await {
            if let Some(estimate) = self.build(entry, days, now, EstimateSource::Predicted) {
                metrics::record_predictor_outcome("predicted");
                info!(ingredient = %ingredient_name, days, "shelf life predicted");
                return estimate;
            }
            warn!(ingredient = %ingredient_name, days, "predicted expiry out of range, degrading to fallback");
            metrics::record_predictor_outcome("fallback_invalid");
        }

        let days = fallback_shelf_life_days(ingredient_name, storage);
        info!(ingredient = %ingredient_name, %storage, days, "shelf life from fallback table");
        self.build(entry, days, now, EstimateSource::Fallback)
            .unwrap_or_else(|| SpoilageEstimate {
                expiry_date: DateTime::<Utc>::MAX_UTC,
                freshness_status: classify_freshness(
                    entry,
                    DateTime::<Utc>::MAX_UTC,
                    now,
                    &self.freshness,
                ),
                estimated_days: days,
                source: EstimateSource::Fallback,
            })
    }

    /// `None` when `entry + days` is not representable.
    fn build(
        &self,
        entry: DateTime<Utc>,
        days: i64,
        now: DateTime<Utc>,
        source: EstimateSource,
    ) -> Option<SpoilageEstimate> {
        let expiry_date = ChronoDuration::try_days(days).and_then(|d| entry.checked_add_signed(d))?;
        Some(SpoilageEstimate {
            expiry_date,
            freshness_status: classify_freshness(entry, expiry_date, now, &self.freshness),
            estimated_days: days,
            source,
        })
    }

    /// Whole predicted days, or `None` when the fallback must be used.
    async fn predicted_days(
        &self,
        ingredient_name: &str,
        storage: StorageClass,
        temperature: Option<f64>,
    ) -> Option<i64> {
        let predictor = match (&self.predictor, self.enabled) {
            (Some(p), true) => p,
            _ => {
                metrics::record_predictor_outcome("fallback_disabled");
                return None;
            }
        };

        let request = ShelfLifeRequest {
            category: FeatureCategory::for_ingredient(ingredient_name),
            storage_temperature: temperature.unwrap_or_else(|| storage.default_temperature()),
            quantity: INTAKE_QUANTITY_FEATURE,
        };

        for attempt in 0..=self.max_retries {
            let outcome = self
                .breaker
                .call(|| async {
                    match tokio::time::timeout(self.timeout, predictor.predict(&request)).await {
                        Ok(result) => result,
                        Err(_) => Err(PredictorError::Timeout(self.timeout.as_millis() as u64)),
                    }
                })
                .await;

            match outcome {
                Ok(days) => {
                    return match days.first().copied() {
                        Some(first)
                            if first.is_finite()
                                && (1.0..=MAX_PREDICTED_SHELF_LIFE_DAYS).contains(&first.trunc()) =>
                        {
                            Some(first.trunc() as i64)
                        }
                        other => {
                            warn!(
                                ingredient = %ingredient_name,
                                prediction = ?other,
                                "unusable shelf-life prediction, degrading to fallback"
                            );
                            metrics::record_predictor_outcome("fallback_invalid");
                            None
                        }
                    };
                }
                Err(CircuitBreakerError::CircuitOpen) => {
                    warn!(ingredient = %ingredient_name, "prediction circuit open, degrading to fallback");
                    metrics::record_predictor_outcome("fallback_circuit_open");
                    return None;
                }
                Err(CircuitBreakerError::ServiceFailure(err)) => {
                    warn!(
                        ingredient = %ingredient_name,
                        attempt = attempt + 1,
                        error = %err,
                        "shelf-life prediction failed"
                    );
                }
            }
        }

        warn!(ingredient = %ingredient_name, "prediction unavailable, degrading to fallback");
        metrics::record_predictor_outcome("fallback_error");
        None
    }

    pub fn predictor_status(&self) -> PredictorStatus {
        PredictorStatus {
            enabled: self.enabled,
            configured: self.predictor.is_some(),
            endpoint: self.predictor.as_ref().and_then(|p| p.endpoint()),
            circuit_state: self.breaker.state(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::MockShelfLifePredictor;
    use chrono::TimeZone;

    fn entry() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 2, 9, 0, 0).unwrap()
    }

    fn enabled_config() -> PredictorConfig {
        PredictorConfig {
            enabled: true,
            endpoint: Some("http://predictor.local/score".into()),
            timeout_ms: 200,
            ..PredictorConfig::default()
        }
    }

    #[test]
    fn fallback_table_scales_by_storage() {
        assert_eq!(fallback_shelf_life_days("Ayam", StorageClass::Refrigerator), 6);
        assert_eq!(fallback_shelf_life_days("  bayam ", StorageClass::Pantry), 3);
        assert_eq!(fallback_shelf_life_days("Ikan", StorageClass::Freezer), 30);
        assert_eq!(fallback_shelf_life_days("bawang merah", StorageClass::Other), 30);
        assert_eq!(fallback_shelf_life_days("kecap", StorageClass::Pantry), 7);
    }

    #[tokio::test]
    async fn uses_truncated_first_prediction() {
        let mut mock = MockShelfLifePredictor::new();
        mock.expect_predict()
            .times(1)
            .returning(|_| Ok(vec![4.9, 12.0]));

        let estimator = SpoilageEstimator::new(
            Some(Arc::new(mock)),
            &enabled_config(),
            FreshnessThresholds::default(),
        );
        let estimate = estimator
            .estimate_at("Tomat", StorageClass::Pantry, entry(), None, entry())
            .await;

        assert_eq!(estimate.source, EstimateSource::Predicted);
        assert_eq!(estimate.estimated_days, 4);
        assert_eq!(estimate.expiry_date, entry() + ChronoDuration::days(4));
        assert_eq!(estimate.freshness_status, FreshnessStatus::Green);
    }

    #[tokio::test]
    async fn failing_predictor_retries_once_then_falls_back() {
        let mut mock = MockShelfLifePredictor::new();
        mock.expect_predict()
            .times(2)
            .returning(|_| Err(PredictorError::Status(503)));

        let estimator = SpoilageEstimator::new(
            Some(Arc::new(mock)),
            &enabled_config(),
            FreshnessThresholds::default(),
        );
        let estimate = estimator
            .estimate_at("Ayam", StorageClass::Refrigerator, entry(), None, entry())
            .await;

        let expected = SpoilageEstimator::fallback_only(FreshnessThresholds::default())
            .estimate_at("Ayam", StorageClass::Refrigerator, entry(), None, entry())
            .await;
        assert_eq!(estimate, expected);
        assert_eq!(estimate.source, EstimateSource::Fallback);
    }

    #[tokio::test]
    async fn sub_day_prediction_falls_back() {
        let mut mock = MockShelfLifePredictor::new();
        mock.expect_predict().times(1).returning(|_| Ok(vec![0.6]));

        let estimator = SpoilageEstimator::new(
            Some(Arc::new(mock)),
            &enabled_config(),
            FreshnessThresholds::default(),
        );
        let estimate = estimator
            .estimate_at("Wortel", StorageClass::Pantry, entry(), None, entry())
            .await;
        assert_eq!(estimate.source, EstimateSource::Fallback);
        assert_eq!(estimate.estimated_days, 14);
    }

    #[tokio::test]
    async fn absurd_prediction_falls_back_instead_of_overflowing() {
        let mut mock = MockShelfLifePredictor::new();
        mock.expect_predict().times(1).returning(|_| Ok(vec![1.0e15]));

        let estimator = SpoilageEstimator::new(
            Some(Arc::new(mock)),
            &enabled_config(),
            FreshnessThresholds::default(),
        );
        let estimate = estimator
            .estimate_at("Tempe", StorageClass::Refrigerator, entry(), None, entry())
            .await;
        assert_eq!(estimate.source, EstimateSource::Fallback);
        assert_eq!(
            estimate.estimated_days,
            fallback_shelf_life_days("Tempe", StorageClass::Refrigerator)
        );
    }

    #[tokio::test]
    async fn prediction_past_the_calendar_end_falls_back() {
        let mut mock = MockShelfLifePredictor::new();
        mock.expect_predict().times(1).returning(|_| Ok(vec![30.0]));

        let estimator = SpoilageEstimator::new(
            Some(Arc::new(mock)),
            &enabled_config(),
            FreshnessThresholds::default(),
        );
        let late_entry = DateTime::<Utc>::MAX_UTC - ChronoDuration::days(10);
        let estimate = estimator
            .estimate_at("Tempe", StorageClass::Pantry, late_entry, None, late_entry)
            .await;
        assert_eq!(estimate.source, EstimateSource::Fallback);
        assert_eq!(estimate.expiry_date, late_entry + ChronoDuration::days(3));
    }

    #[tokio::test]
    async fn sends_storage_temperature_when_none_measured() {
        let mut mock = MockShelfLifePredictor::new();
        mock.expect_predict()
            .withf(|req| {
                req.storage_temperature == -18.0
                    && req.category == FeatureCategory::AnimalProtein
                    && req.quantity == 1.0
            })
            .times(1)
            .returning(|_| Ok(vec![90.0]));

        let estimator = SpoilageEstimator::new(
            Some(Arc::new(mock)),
            &enabled_config(),
            FreshnessThresholds::default(),
        );
        let estimate = estimator
            .estimate_at("Daging Sapi", StorageClass::Freezer, entry(), None, entry())
            .await;
        assert_eq!(estimate.estimated_days, 90);
    }

    #[tokio::test]
    async fn disabled_predictor_is_never_called() {
        let mut mock = MockShelfLifePredictor::new();
        mock.expect_predict().times(0);
        mock.expect_endpoint().returning(|| None);

        let config = PredictorConfig {
            enabled: false,
            ..enabled_config()
        };
        let estimator =
            SpoilageEstimator::new(Some(Arc::new(mock)), &config, FreshnessThresholds::default());
        let estimate = estimator
            .estimate_at("Tahu", StorageClass::Pantry, entry(), None, entry())
            .await;
        assert_eq!(estimate.source, EstimateSource::Fallback);
        assert!(!estimator.predictor_status().enabled);
    }
}
