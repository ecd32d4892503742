use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::batch::{FreshnessStatus, WriteOffReason};
use crate::services::spoilage::EstimateSource;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Notifications produced by the engine. Delivery (push, email, dashboards) is up to the
/// consumer of the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    BatchCreated {
        batch_id: Uuid,
        batch_code: String,
        ingredient_name: String,
        weight: Decimal,
        unit: String,
        expiry_date: DateTime<Utc>,
        estimate_source: EstimateSource,
    },
    FreshnessStatusChanged {
        batch_id: Uuid,
        batch_code: String,
        ingredient_name: String,
        old_status: FreshnessStatus,
        new_status: FreshnessStatus,
    },
    ExpiryAlert {
        batch_id: Uuid,
        batch_code: String,
        ingredient_name: String,
        days_until_expiry: Option<i64>,
    },
    LowStock {
        ingredient_name: String,
        remaining: Decimal,
        unit: String,
        threshold: Decimal,
    },
    BatchExhausted {
        batch_id: Uuid,
        batch_code: String,
        ingredient_name: String,
    },
    BatchWrittenOff {
        batch_id: Uuid,
        batch_code: String,
        ingredient_name: String,
        reason: WriteOffReason,
        wasted_weight: Decimal,
    },
    BatchExpiredCleanup {
        batch_id: Uuid,
        batch_code: String,
        ingredient_name: String,
    },
    DeviceOffline {
        device_id: String,
        last_seen: DateTime<Utc>,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::BatchCreated { .. } => "batch_created",
            Event::FreshnessStatusChanged { .. } => "freshness_status_changed",
            Event::ExpiryAlert { .. } => "expiry_alert",
            Event::LowStock { .. } => "low_stock",
            Event::BatchExhausted { .. } => "batch_exhausted",
            Event::BatchWrittenOff { .. } => "batch_written_off",
            Event::BatchExpiredCleanup { .. } => "batch_expired_cleanup",
            Event::DeviceOffline { .. } => "device_offline",
        }
    }

    /// The batch the event is about, if any.
    pub fn batch_id(&self) -> Option<Uuid> {
        match self {
            Event::BatchCreated { batch_id, .. }
            | Event::FreshnessStatusChanged { batch_id, .. }
            | Event::ExpiryAlert { batch_id, .. }
            | Event::BatchExhausted { batch_id, .. }
            | Event::BatchWrittenOff { batch_id, .. }
            | Event::BatchExpiredCleanup { batch_id, .. } => Some(*batch_id),
            Event::LowStock { .. } | Event::DeviceOffline { .. } => None,
        }
    }
}

// Handlers implementing this trait receive every event after it has been logged.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: Event) -> Result<(), String>;
}

/// Drains the channel, logging each event and forwarding it to `handler` if one is set.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, handler: Option<Arc<dyn EventHandler>>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::BatchCreated {
                batch_code,
                ingredient_name,
                weight,
                unit,
                expiry_date,
                estimate_source,
                ..
            } => {
                info!(
                    batch_code = %batch_code,
                    ingredient = %ingredient_name,
                    weight = %weight,
                    unit = %unit,
                    expiry = %expiry_date,
                    source = ?estimate_source,
                    "batch created"
                );
            }
            Event::FreshnessStatusChanged {
                batch_code,
                old_status,
                new_status,
                ..
            } => {
                info!(batch_code = %batch_code, from = %old_status, to = %new_status, "freshness status changed");
            }
            Event::ExpiryAlert {
                batch_code,
                ingredient_name,
                days_until_expiry,
                ..
            } => {
                warn!(
                    batch_code = %batch_code,
                    ingredient = %ingredient_name,
                    days_until_expiry = ?days_until_expiry,
                    "batch is about to expire"
                );
            }
            Event::LowStock {
                ingredient_name,
                remaining,
                unit,
                ..
            } => {
                warn!(ingredient = %ingredient_name, remaining = %remaining, unit = %unit, "low stock");
            }
            Event::BatchExhausted { batch_code, .. } => {
                info!(batch_code = %batch_code, "batch exhausted");
            }
            Event::BatchWrittenOff {
                batch_code,
                reason,
                wasted_weight,
                ..
            } => {
                warn!(batch_code = %batch_code, reason = %reason, wasted = %wasted_weight, "batch written off");
            }
            Event::BatchExpiredCleanup { batch_code, .. } => {
                info!(batch_code = %batch_code, "expired batch deactivated");
            }
            Event::DeviceOffline {
                device_id,
                last_seen,
            } => {
                warn!(device_id = %device_id, last_seen = %last_seen, "device offline");
            }
        }

        if let Some(handler) = &handler {
            let name = event.name();
            if let Err(e) = handler.handle_event(event).await {
                error!("Failed to handle {} event: {}", name, e);
            }
        }
    }

    warn!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle_event(&self, event: Event) -> Result<(), String> {
            self.seen.lock().await.push(event.name());
            Ok(())
        }
    }

    #[tokio::test]
    async fn events_are_forwarded_to_handler_until_channel_closes() {
        let (tx, rx) = mpsc::channel(8);
        let sender = EventSender::new(tx);
        let recorder = Arc::new(Recorder::default());

        sender
            .send(Event::DeviceOffline {
                device_id: "sensor-1".into(),
                last_seen: Utc::now(),
            })
            .await
            .unwrap();
        sender
            .send(Event::BatchExhausted {
                batch_id: Uuid::new_v4(),
                batch_code: "AYA-20240101-RFG-001".into(),
                ingredient_name: "Ayam".into(),
            })
            .await
            .unwrap();
        drop(sender);

        process_events(rx, Some(recorder.clone() as Arc<dyn EventHandler>)).await;
        assert_eq!(
            *recorder.seen.lock().await,
            vec!["device_offline", "batch_exhausted"]
        );
    }

    #[tokio::test]
    async fn send_fails_once_receiver_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let err = EventSender::new(tx)
            .send(Event::DeviceOffline {
                device_id: "x".into(),
                last_seen: Utc::now(),
            })
            .await
            .unwrap_err();
        assert!(err.starts_with("Failed to send event"));
    }
}
