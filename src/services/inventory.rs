use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::{AppConfig, StockConfig},
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    models::batch::{Batch, Category, FreshnessStatus, NewBatch, StorageClass, WriteOffReason},
    repositories::BatchRepository,
    services::{
        compliance::{ComplianceReport, ComplianceScorer},
        dashboard::{
            batches_with_urgency, build_fifo_analysis, build_fifo_summary,
            build_priority_dashboard, build_storage_layout, FifoAnalysis, FifoSummary,
            PriorityDashboard, PriorityEntry, StorageLayout,
        },
        fifo_ordering::fifo_order_matching,
        freshness::{classify_freshness, FreshnessThresholds},
        freshness_sweep::{CleanupReport, FreshnessSweep, SweepReport, SweepState},
        picking::{AllocationDraw, PickResult, PickingAllocator},
        spoilage::{EstimateSource, PredictorStatus, SpoilageEstimator},
        urgency::{UrgencyLevel, UrgencyThresholds},
    },
};

/// Service for managing perishable batches: intake, picking, consumption and the
/// periodic freshness sweep.
#[derive(Clone)]
pub struct InventoryService {
    repository: Arc<dyn BatchRepository>,
    estimator: SpoilageEstimator,
    allocator: PickingAllocator,
    scorer: ComplianceScorer,
    sweep: FreshnessSweep,
    sweep_state: Arc<Mutex<SweepState>>,
    event_sender: EventSender,
    freshness: FreshnessThresholds,
    urgency: UrgencyThresholds,
    stock: StockConfig,
}

impl InventoryService {
    /// Creates a new inventory service instance
    pub fn new(
        repository: Arc<dyn BatchRepository>,
        estimator: SpoilageEstimator,
        event_sender: EventSender,
        config: &AppConfig,
    ) -> Self {
        Self {
            repository,
            estimator,
            allocator: PickingAllocator::new(config.urgency),
            scorer: ComplianceScorer::new(config.compliance.min_batches),
            sweep: FreshnessSweep::new(config.freshness, config.sweep.device_offline_after()),
            sweep_state: Arc::new(Mutex::new(SweepState::new())),
            event_sender,
            freshness: config.freshness,
            urgency: config.urgency,
            stock: config.stock.clone(),
        }
    }

    async fn publish(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.event_sender.send(event).await {
            error!(event = name, error = %e, "failed to publish event");
        }
    }

    /// Registers a new batch. When the intake carries no expiry, one is estimated.
    #[instrument(skip(self, request), fields(ingredient = %request.ingredient_name))]
    pub async fn create_batch(&self, request: NewBatch) -> Result<Batch, ServiceError> {
        request.validate()?;

        let now = Utc::now();
        let ingredient_name = request.ingredient_name.trim().to_string();
        let storage = StorageClass::normalize(&request.storage_location);
        let category = request
            .category
            .unwrap_or_else(|| Category::infer(&ingredient_name));
        let entry_date = request.entry_date.unwrap_or(now);

        let (expiry_date, freshness_status, source) = match request.expiry_date {
            Some(expiry) if expiry < entry_date => {
                return Err(ServiceError::ValidationError(
                    "expiry_date must not be before entry_date".to_string(),
                ))
            }
            Some(expiry) => (
                expiry,
                classify_freshness(entry_date, expiry, now, &self.freshness),
                EstimateSource::Supplied,
            ),
            None => {
                let estimate = self
                    .estimator
                    .estimate_at(
                        &ingredient_name,
                        storage,
                        entry_date,
                        request.storage_temperature,
                        now,
                    )
                    .await;
                (
                    estimate.expiry_date,
                    estimate.freshness_status,
                    estimate.source,
                )
            }
        };

        let prefix = batch_code_prefix(&ingredient_name, entry_date, storage);
        let serial = self.repository.next_serial(&prefix).await?;
        let batch = Batch {
            id: Uuid::new_v4(),
            batch_code: format!("{}-{:03}", prefix, serial),
            ingredient_name,
            category,
            weight: request.weight,
            unit: request.unit,
            entry_date,
            expiry_date: Some(expiry_date),
            freshness_status,
            active: true,
            storage,
            source: request.source,
            notes: request.notes,
        };

        let batch = self.repository.insert(batch).await?;
        info!(
            batch_code = %batch.batch_code,
            expiry = %expiry_date,
            status = %batch.freshness_status,
            "batch registered"
        );

        self.publish(Event::BatchCreated {
            batch_id: batch.id,
            batch_code: batch.batch_code.clone(),
            ingredient_name: batch.ingredient_name.clone(),
            weight: batch.weight,
            unit: batch.unit.clone(),
            expiry_date,
            estimate_source: source,
        })
        .await;

        Ok(batch)
    }

    /// Plans which batches to draw from, without changing stock.
    #[instrument(skip(self))]
    pub async fn recommend_picking(
        &self,
        ingredient: &str,
        requested: Decimal,
        unit: &str,
    ) -> Result<PickResult, ServiceError> {
        validate_pick_request(ingredient, requested)?;

        let snapshot = self.repository.list_active_by_ingredient(ingredient).await?;
        let result = self
            .allocator
            .pick(&snapshot, ingredient, requested, unit, Utc::now());

        metrics::record_pick(result.outcome());
        info!(
            outcome = result.outcome(),
            draws = result.draws().len(),
            available = %result.total_available(),
            "picking plan computed"
        );
        Ok(result)
    }

    /// Draws `quantity` from stock in FIFO order and returns the applied draws.
    #[instrument(skip(self))]
    pub async fn consume(
        &self,
        ingredient: &str,
        quantity: Decimal,
        unit: &str,
    ) -> Result<Vec<AllocationDraw>, ServiceError> {
        validate_pick_request(ingredient, quantity)?;

        let snapshot = self.repository.list_active_by_ingredient(ingredient).await?;
        let result = self
            .allocator
            .pick(&snapshot, ingredient, quantity, unit, Utc::now());
        metrics::record_pick(result.outcome());

        if !result.is_fulfilled() {
            warn!(shortage = %result.shortage(), "consumption rejected");
            return Err(ServiceError::InsufficientStock(result.message()));
        }

        let draws = result.into_draws();
        for draw in &draws {
            let expected_weight = snapshot
                .iter()
                .find(|b| b.id == draw.batch_id)
                .map(|b| b.weight)
                .ok_or(ServiceError::ConcurrentModification(draw.batch_id))?;

            let updated = self
                .repository
                .apply_draw(draw.batch_id, expected_weight, draw.quantity)
                .await
                .map_err(|e| {
                    warn!(
                        batch_id = %draw.batch_id,
                        error_code = e.code(),
                        retryable = e.is_retryable(),
                        "draw rejected"
                    );
                    e
                })?;
            metrics::record_allocated(draw.quantity, &draw.unit);

            if !updated.active {
                self.publish(Event::BatchExhausted {
                    batch_id: updated.id,
                    batch_code: updated.batch_code.clone(),
                    ingredient_name: updated.ingredient_name.clone(),
                })
                .await;
            }
        }

        info!(draws = draws.len(), "consumption applied");
        self.check_low_stock(ingredient, unit).await?;
        Ok(draws)
    }

    /// Emits a low-stock event when the remaining total is positive but under the
    /// configured threshold. Only batches stocked in `unit` are counted. Returns the
    /// remaining total.
    #[instrument(skip(self))]
    pub async fn check_low_stock(&self, ingredient: &str, unit: &str) -> Result<Decimal, ServiceError> {
        let remaining: Decimal = self
            .repository
            .list_active_by_ingredient(ingredient)
            .await?
            .iter()
            .filter(|b| b.unit.eq_ignore_ascii_case(unit))
            .map(|b| b.weight)
            .sum();

        if remaining > Decimal::ZERO && remaining < self.stock.low_stock_threshold {
            self.publish(Event::LowStock {
                ingredient_name: ingredient.to_string(),
                remaining,
                unit: unit.to_string(),
                threshold: self.stock.low_stock_threshold,
            })
            .await;
        }
        Ok(remaining)
    }

    /// Takes a batch out of stock before it is used up. Returns the wasted weight.
    #[instrument(skip(self))]
    pub async fn write_off(
        &self,
        batch_code: &str,
        reason: WriteOffReason,
    ) -> Result<Decimal, ServiceError> {
        let found = self
            .repository
            .find_by_code(batch_code)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Batch {} not found", batch_code)))?;

        // weight and status are read under the same guard that retires the batch
        let batch = self
            .repository
            .deactivate(found.id, Some(FreshnessStatus::Red))
            .await?
            .ok_or_else(|| {
                ServiceError::Conflict(format!("Batch {} is already inactive", batch_code))
            })?;
        let old_status = batch.freshness_status;
        let wasted = batch.weight;

        warn!(wasted = %wasted, %reason, "batch written off");
        self.publish(Event::BatchWrittenOff {
            batch_id: batch.id,
            batch_code: batch.batch_code.clone(),
            ingredient_name: batch.ingredient_name.clone(),
            reason,
            wasted_weight: wasted,
        })
        .await;
        if old_status != FreshnessStatus::Red {
            self.publish(Event::FreshnessStatusChanged {
                batch_id: batch.id,
                batch_code: batch.batch_code.clone(),
                ingredient_name: batch.ingredient_name.clone(),
                old_status,
                new_status: FreshnessStatus::Red,
            })
            .await;
        }

        Ok(wasted)
    }

    pub async fn run_freshness_sweep(&self) -> Result<SweepReport, ServiceError> {
        self.run_freshness_sweep_at(Utc::now()).await
    }

    /// Re-classifies every active batch as of `now`, persists changed statuses and
    /// publishes the resulting events.
    #[instrument(skip(self))]
    pub async fn run_freshness_sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, ServiceError> {
        let snapshot = self.repository.list_active().await?;
        let mut report = {
            let mut state = self.sweep_state.lock().await;
            self.sweep.run(&mut state, &snapshot, now)
        };

        let mut skipped = HashSet::new();
        for change in &report.changes {
            let applied = self
                .repository
                .update_status(change.batch_id, change.old_status, change.new_status)
                .await?;
            if applied.is_none() {
                skipped.insert(change.batch_id);
            }
        }
        if !skipped.is_empty() {
            info!(skipped = skipped.len(), "batches changed during sweep, left for next run");
        }
        report.discard(&skipped);

        for event in &report.events {
            self.publish(event.clone()).await;
        }
        Ok(report)
    }

    pub async fn cleanup_expired_batches(&self) -> Result<CleanupReport, ServiceError> {
        self.cleanup_expired_batches_at(Utc::now()).await
    }

    #[instrument(skip(self))]
    pub async fn cleanup_expired_batches_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<CleanupReport, ServiceError> {
        let snapshot = self.repository.list_active().await?;
        let mut report = self.sweep.cleanup_expired(&snapshot, now);

        let mut skipped = HashSet::new();
        for batch in &report.deactivated {
            if self.repository.deactivate(batch.id, None).await?.is_none() {
                skipped.insert(batch.id);
            }
        }
        report.discard(&skipped);

        for event in &report.events {
            self.publish(event.clone()).await;
        }
        Ok(report)
    }

    pub async fn record_device_activity(&self, device_id: &str) {
        let mut state = self.sweep_state.lock().await;
        state.record_device_activity(device_id, Utc::now());
    }

    #[instrument(skip(self))]
    pub async fn compliance_report(&self) -> Result<ComplianceReport, ServiceError> {
        let snapshot = self.repository.list_active().await?;
        Ok(self.scorer.score(&snapshot))
    }

    /// Active batches in one urgency tier. `filter` is parsed case-insensitively.
    #[instrument(skip(self))]
    pub async fn batches_by_urgency(&self, filter: &str) -> Result<Vec<PriorityEntry>, ServiceError> {
        let level = UrgencyLevel::parse_filter(filter)?;
        let snapshot = self.repository.list_active().await?;
        Ok(batches_with_urgency(&snapshot, level, Utc::now(), &self.urgency))
    }

    #[instrument(skip(self))]
    pub async fn priority_dashboard(&self) -> Result<PriorityDashboard, ServiceError> {
        let snapshot = self.repository.list_active().await?;
        let compliance = self.scorer.score(&snapshot);
        Ok(build_priority_dashboard(
            &snapshot,
            compliance,
            Utc::now(),
            &self.urgency,
        ))
    }

    #[instrument(skip(self))]
    pub async fn fifo_summary(&self, ingredient: &str) -> Result<FifoSummary, ServiceError> {
        let snapshot = self.repository.list_active_by_ingredient(ingredient).await?;
        Ok(build_fifo_summary(&snapshot, ingredient, Utc::now(), &self.urgency))
    }

    /// Active batches in consumption order, optionally narrowed to one ingredient and/or
    /// one storage class.
    pub async fn fifo_queue(
        &self,
        ingredient: Option<&str>,
        storage: Option<StorageClass>,
    ) -> Result<Vec<Batch>, ServiceError> {
        let snapshot = match ingredient {
            Some(name) => self.repository.list_active_by_ingredient(name).await?,
            None => self.repository.list_active().await?,
        };
        Ok(fifo_order_matching(&snapshot, ingredient, storage)
            .into_iter()
            .cloned()
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn storage_layout(
        &self,
        storage: Option<StorageClass>,
    ) -> Result<Vec<StorageLayout>, ServiceError> {
        let snapshot = self.repository.list_active().await?;
        Ok(build_storage_layout(&snapshot, storage))
    }

    #[instrument(skip(self))]
    pub async fn fifo_analysis(&self) -> Result<FifoAnalysis, ServiceError> {
        let snapshot = self.repository.list_active().await?;
        let compliance = self.scorer.score(&snapshot);
        let analysis = build_fifo_analysis(&snapshot, &compliance, Utc::now(), &self.urgency);
        info!(
            batches = analysis.total_batches,
            score = analysis.compliance_score,
            "fifo analysis computed"
        );
        Ok(analysis)
    }

    pub fn predictor_status(&self) -> PredictorStatus {
        self.estimator.predictor_status()
    }
}

fn validate_pick_request(ingredient: &str, quantity: Decimal) -> Result<(), ServiceError> {
    if ingredient.trim().is_empty() {
        return Err(ServiceError::ValidationError(
            "ingredient name must not be empty".to_string(),
        ));
    }
    if quantity <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "requested quantity must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

/// `{ING3}-{YYYYMMDD}-{LOC}`: first three alphanumerics of the name, upper-cased and
/// padded with `X`.
pub fn batch_code_prefix(ingredient_name: &str, entry: DateTime<Utc>, storage: StorageClass) -> String {
    let mut ing: String = ingredient_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(3)
        .collect::<String>()
        .to_ascii_uppercase();
    while ing.len() < 3 {
        ing.push('X');
    }
    format!("{}-{}-{}", ing, entry.format("%Y%m%d"), storage.code())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::batch::MockBatchRepository;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use tokio::sync::mpsc;

    #[test]
    fn batch_code_prefix_format() {
        let entry = Utc.with_ymd_and_hms(2024, 9, 3, 10, 0, 0).unwrap();
        assert_eq!(
            batch_code_prefix("Ayam Fillet", entry, StorageClass::Refrigerator),
            "AYA-20240903-RFG"
        );
        assert_eq!(batch_code_prefix("Ub", entry, StorageClass::Other), "UBX-20240903-OTR");
    }

    #[tokio::test]
    async fn repository_errors_propagate() {
        let mut repo = MockBatchRepository::new();
        repo.expect_list_active()
            .returning(|| Err(ServiceError::InternalError("store offline".into())));

        let (tx, _rx) = mpsc::channel(4);
        let config = AppConfig::default();
        let service = InventoryService::new(
            Arc::new(repo),
            SpoilageEstimator::fallback_only(config.freshness),
            EventSender::new(tx),
            &config,
        );

        let result = service.compliance_report().await;
        assert!(matches!(result, Err(ServiceError::InternalError(_))));
    }

    #[tokio::test]
    async fn non_positive_requests_are_rejected_before_reading_stock() {
        let mut repo = MockBatchRepository::new();
        repo.expect_list_active_by_ingredient().times(0);

        let (tx, _rx) = mpsc::channel(4);
        let config = AppConfig::default();
        let service = InventoryService::new(
            Arc::new(repo),
            SpoilageEstimator::fallback_only(config.freshness),
            EventSender::new(tx),
            &config,
        );

        let result = service.recommend_picking("Ayam", dec!(0), "kg").await;
        assert!(matches!(result, Err(ServiceError::ValidationError(_))));
        let result = service.consume("", dec!(1), "kg").await;
        assert!(matches!(result, Err(ServiceError::ValidationError(_))));
    }
}
