#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use kitchen_fifo::{
    config::AppConfig,
    events::{Event, EventSender},
    repositories::InMemoryBatchRepository,
    services::spoilage::SpoilageEstimator,
    Batch, Category, FreshnessStatus, InventoryService, StorageClass,
};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Fixed reference instant so that day arithmetic in tests is stable.
pub fn day_zero() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
}

pub fn day(n: i64) -> DateTime<Utc> {
    day_zero() + Duration::days(n)
}

/// Builder for snapshot batches used by the pure planning functions.
#[derive(Debug, Clone)]
pub struct BatchBuilder {
    batch: Batch,
}

impl BatchBuilder {
    pub fn new(code: &str, ingredient: &str) -> Self {
        Self {
            batch: Batch {
                id: Uuid::new_v4(),
                batch_code: code.to_string(),
                ingredient_name: ingredient.to_string(),
                category: Category::infer(ingredient),
                weight: Decimal::ONE,
                unit: "kg".to_string(),
                entry_date: day_zero(),
                expiry_date: None,
                freshness_status: FreshnessStatus::Green,
                active: true,
                storage: StorageClass::Refrigerator,
                source: None,
                notes: None,
            },
        }
    }

    pub fn weight(mut self, weight: Decimal) -> Self {
        self.batch.weight = weight;
        self
    }

    pub fn entered(mut self, at: DateTime<Utc>) -> Self {
        self.batch.entry_date = at;
        self
    }

    pub fn expires(mut self, at: DateTime<Utc>) -> Self {
        self.batch.expiry_date = Some(at);
        self
    }

    pub fn storage(mut self, storage: StorageClass) -> Self {
        self.batch.storage = storage;
        self
    }

    pub fn status(mut self, status: FreshnessStatus) -> Self {
        self.batch.freshness_status = status;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.batch.active = false;
        self
    }

    pub fn build(self) -> Batch {
        self.batch
    }
}

/// Service wired to an in-memory repository and the fallback estimator.
pub struct TestKitchen {
    pub service: InventoryService,
    pub repository: Arc<InMemoryBatchRepository>,
    pub events: mpsc::Receiver<Event>,
}

impl TestKitchen {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let (tx, rx) = mpsc::channel(1024);
        let repository = Arc::new(InMemoryBatchRepository::new());
        let service = InventoryService::new(
            repository.clone(),
            SpoilageEstimator::fallback_only(config.freshness),
            EventSender::new(tx),
            &config,
        );
        Self {
            service,
            repository,
            events: rx,
        }
    }

    /// Everything published so far.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
