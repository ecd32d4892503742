use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::batch::{Batch, FreshnessStatus};

/// Storage boundary for batches.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BatchRepository: Send + Sync {
    async fn list_active(&self) -> Result<Vec<Batch>, ServiceError>;

    /// Active batches of one ingredient, oldest entry first.
    async fn list_active_by_ingredient(&self, ingredient: &str)
        -> Result<Vec<Batch>, ServiceError>;

    async fn find(&self, id: Uuid) -> Result<Option<Batch>, ServiceError>;

    async fn find_by_code(&self, batch_code: &str) -> Result<Option<Batch>, ServiceError>;

    /// Stores a new batch. Batch codes are unique.
    async fn insert(&self, batch: Batch) -> Result<Batch, ServiceError>;

    /// Moves an active batch from `expected` to `status`. Returns `None`, leaving the
    /// batch untouched, when it is inactive or no longer in `expected`.
    async fn update_status(
        &self,
        id: Uuid,
        expected: FreshnessStatus,
        status: FreshnessStatus,
    ) -> Result<Option<Batch>, ServiceError>;

    /// Deactivates an active batch, optionally forcing its status. Weight is kept.
    /// Returns the batch as it was just before, or `None` if it was already inactive.
    async fn deactivate(
        &self,
        id: Uuid,
        status: Option<FreshnessStatus>,
    ) -> Result<Option<Batch>, ServiceError>;

    /// Deducts `quantity` from the batch if its weight is still `expected_weight`.
    /// A batch that reaches zero is deactivated.
    async fn apply_draw(
        &self,
        id: Uuid,
        expected_weight: Decimal,
        quantity: Decimal,
    ) -> Result<Batch, ServiceError>;

    /// Next 1-based serial for batch codes sharing `prefix`.
    async fn next_serial(&self, prefix: &str) -> Result<u32, ServiceError>;
}

/// Process-local repository backed by [`DashMap`]s.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBatchRepository {
    batches: Arc<DashMap<Uuid, Batch>>,
    codes: Arc<DashMap<String, Uuid>>,
    serials: Arc<DashMap<String, u32>>,
}

impl InMemoryBatchRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Every stored batch, active or not.
    pub fn snapshot(&self) -> Vec<Batch> {
        self.batches.iter().map(|entry| entry.value().clone()).collect()
    }
}

#[async_trait]
impl BatchRepository for InMemoryBatchRepository {
    async fn list_active(&self) -> Result<Vec<Batch>, ServiceError> {
        Ok(self
            .batches
            .iter()
            .filter(|entry| entry.active)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn list_active_by_ingredient(
        &self,
        ingredient: &str,
    ) -> Result<Vec<Batch>, ServiceError> {
        let mut batches: Vec<Batch> = self
            .batches
            .iter()
            .filter(|entry| entry.active && entry.ingredient_name == ingredient)
            .map(|entry| entry.value().clone())
            .collect();
        batches.sort_by(|a, b| a.entry_date.cmp(&b.entry_date).then_with(|| a.id.cmp(&b.id)));
        Ok(batches)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Batch>, ServiceError> {
        Ok(self.batches.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_by_code(&self, batch_code: &str) -> Result<Option<Batch>, ServiceError> {
        let Some(id) = self.codes.get(batch_code).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        self.find(id).await
    }

    async fn insert(&self, batch: Batch) -> Result<Batch, ServiceError> {
        use dashmap::mapref::entry::Entry;

        match self.codes.entry(batch.batch_code.clone()) {
            Entry::Occupied(_) => {
                return Err(ServiceError::Conflict(format!(
                    "Batch code {} already exists",
                    batch.batch_code
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(batch.id);
            }
        }
        self.batches.insert(batch.id, batch.clone());
        debug!(batch_id = %batch.id, batch_code = %batch.batch_code, "batch inserted");
        Ok(batch)
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: FreshnessStatus,
        status: FreshnessStatus,
    ) -> Result<Option<Batch>, ServiceError> {
        let mut batch = self
            .batches
            .get_mut(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("Batch {} not found", id)))?;

        if !batch.active || batch.freshness_status != expected {
            debug!(batch_id = %id, "status update skipped, batch changed");
            return Ok(None);
        }
        batch.freshness_status = status;
        Ok(Some(batch.clone()))
    }

    async fn deactivate(
        &self,
        id: Uuid,
        status: Option<FreshnessStatus>,
    ) -> Result<Option<Batch>, ServiceError> {
        let mut batch = self
            .batches
            .get_mut(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("Batch {} not found", id)))?;

        if !batch.active {
            return Ok(None);
        }
        let before = batch.clone();
        batch.active = false;
        if let Some(status) = status {
            batch.freshness_status = status;
        }
        Ok(Some(before))
    }

    async fn apply_draw(
        &self,
        id: Uuid,
        expected_weight: Decimal,
        quantity: Decimal,
    ) -> Result<Batch, ServiceError> {
        if quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "draw quantity must be greater than 0".to_string(),
            ));
        }

        // the entry guard serializes concurrent draws on the same batch
        let mut batch = self
            .batches
            .get_mut(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("Batch {} not found", id)))?;

        if !batch.active || batch.weight != expected_weight {
            return Err(ServiceError::ConcurrentModification(id));
        }
        if quantity > batch.weight {
            return Err(ServiceError::InsufficientStock(format!(
                "Batch {} holds {} {}, cannot draw {}",
                batch.batch_code,
                batch.weight.normalize(),
                batch.unit,
                quantity.normalize()
            )));
        }

        batch.weight -= quantity;
        if batch.weight.is_zero() {
            batch.active = false;
        }
        Ok(batch.clone())
    }

    async fn next_serial(&self, prefix: &str) -> Result<u32, ServiceError> {
        let mut serial = self.serials.entry(prefix.to_string()).or_insert(0);
        *serial += 1;
        Ok(*serial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::batch::{Category, FreshnessStatus, StorageClass};
    use assert_matches::assert_matches;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn batch(code: &str, weight: Decimal, entry_offset_days: i64) -> Batch {
        Batch {
            id: Uuid::new_v4(),
            batch_code: code.to_string(),
            ingredient_name: "Telur".to_string(),
            category: Category::Protein,
            weight,
            unit: "kg".to_string(),
            entry_date: Utc::now() + Duration::days(entry_offset_days),
            expiry_date: None,
            freshness_status: FreshnessStatus::Green,
            active: true,
            storage: StorageClass::Refrigerator,
            source: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn duplicate_codes_conflict() {
        let repo = InMemoryBatchRepository::new();
        repo.insert(batch("TEL-1", dec!(1), 0)).await.unwrap();
        let result = repo.insert(batch("TEL-1", dec!(2), 0)).await;
        assert_matches!(result, Err(ServiceError::Conflict(_)));
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn list_by_ingredient_is_entry_ordered() {
        let repo = InMemoryBatchRepository::new();
        repo.insert(batch("NEW", dec!(1), 2)).await.unwrap();
        repo.insert(batch("OLD", dec!(1), -2)).await.unwrap();
        let listed = repo.list_active_by_ingredient("Telur").await.unwrap();
        let codes: Vec<_> = listed.iter().map(|b| b.batch_code.as_str()).collect();
        assert_eq!(codes, vec!["OLD", "NEW"]);
        assert!(repo.list_active_by_ingredient("telur").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn draw_to_zero_deactivates() {
        let repo = InMemoryBatchRepository::new();
        let stored = repo.insert(batch("TEL-2", dec!(3), 0)).await.unwrap();

        let after = repo.apply_draw(stored.id, dec!(3), dec!(1.25)).await.unwrap();
        assert_eq!(after.weight, dec!(1.75));
        assert!(after.active);

        let emptied = repo.apply_draw(stored.id, dec!(1.75), dec!(1.75)).await.unwrap();
        assert!(emptied.weight.is_zero());
        assert!(!emptied.active);
        assert!(repo.list_active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stale_expected_weight_is_rejected() {
        let repo = InMemoryBatchRepository::new();
        let stored = repo.insert(batch("TEL-3", dec!(5), 0)).await.unwrap();
        repo.apply_draw(stored.id, dec!(5), dec!(1)).await.unwrap();

        let result = repo.apply_draw(stored.id, dec!(5), dec!(1)).await;
        assert_matches!(result, Err(ServiceError::ConcurrentModification(id)) if id == stored.id);
    }

    #[tokio::test]
    async fn serials_count_per_prefix() {
        let repo = InMemoryBatchRepository::new();
        assert_eq!(repo.next_serial("AYA-20240101-RFG").await.unwrap(), 1);
        assert_eq!(repo.next_serial("AYA-20240101-RFG").await.unwrap(), 2);
        assert_eq!(repo.next_serial("TEL-20240101-RFG").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn status_update_only_applies_to_the_expected_status() {
        let repo = InMemoryBatchRepository::new();
        let stored = repo.insert(batch("TEL-4", dec!(2), 0)).await.unwrap();

        let moved = repo
            .update_status(stored.id, FreshnessStatus::Green, FreshnessStatus::Yellow)
            .await
            .unwrap();
        assert_eq!(moved.map(|b| b.freshness_status), Some(FreshnessStatus::Yellow));

        let stale = repo
            .update_status(stored.id, FreshnessStatus::Green, FreshnessStatus::Red)
            .await
            .unwrap();
        assert!(stale.is_none());

        let found = repo.find_by_code("TEL-4").await.unwrap().unwrap();
        assert_eq!(found.freshness_status, FreshnessStatus::Yellow);
        assert!(repo.find_by_code("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn status_update_never_touches_weight_or_reactivates() {
        let repo = InMemoryBatchRepository::new();
        let stored = repo.insert(batch("TEL-5", dec!(4), 0)).await.unwrap();
        repo.apply_draw(stored.id, dec!(4), dec!(4)).await.unwrap();

        let skipped = repo
            .update_status(stored.id, FreshnessStatus::Green, FreshnessStatus::Red)
            .await
            .unwrap();
        assert!(skipped.is_none());

        let reloaded = repo.find(stored.id).await.unwrap().unwrap();
        assert!(reloaded.weight.is_zero());
        assert!(!reloaded.active);
    }

    #[tokio::test]
    async fn deactivate_reports_the_weight_it_retired() {
        let repo = InMemoryBatchRepository::new();
        let stored = repo.insert(batch("TEL-6", dec!(3), 0)).await.unwrap();
        repo.apply_draw(stored.id, dec!(3), dec!(1)).await.unwrap();

        let before = repo
            .deactivate(stored.id, Some(FreshnessStatus::Red))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(before.weight, dec!(2));
        assert_eq!(before.freshness_status, FreshnessStatus::Green);

        let reloaded = repo.find(stored.id).await.unwrap().unwrap();
        assert!(!reloaded.active);
        assert_eq!(reloaded.weight, dec!(2));
        assert_eq!(reloaded.freshness_status, FreshnessStatus::Red);

        assert!(repo.deactivate(stored.id, None).await.unwrap().is_none());
        assert_matches!(
            repo.deactivate(Uuid::new_v4(), None).await,
            Err(ServiceError::NotFound(_))
        );
    }
}
