use std::sync::Arc;

use anyhow::Context;
use tokio::{signal, sync::mpsc, time};
use tracing::{error, info, warn};

use kitchen_fifo as fifo;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = fifo::config::load_config().context("failed to load configuration")?;
    fifo::config::init_tracing(cfg.log_level(), cfg.log_json || cfg.is_production());
    info!(environment = %cfg.environment, "starting kitchen-fifo");

    // Init events
    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = fifo::events::EventSender::new(event_tx);
    tokio::spawn(fifo::events::process_events(event_rx, None));

    let predictor = fifo::ml::build_predictor(&cfg.predictor)
        .context("failed to build shelf-life predictor client")?;
    if predictor.is_none() {
        warn!("shelf-life predictor disabled; expiry estimates use the fallback table");
    }
    let estimator =
        fifo::services::spoilage::SpoilageEstimator::new(predictor, &cfg.predictor, cfg.freshness);

    let repository = Arc::new(fifo::repositories::InMemoryBatchRepository::new());
    let service = fifo::InventoryService::new(repository, estimator, event_sender, &cfg);
    info!(status = ?service.predictor_status(), "predictor status");

    let mut sweep_tick = time::interval(cfg.sweep.interval());
    let mut cleanup_tick = time::interval(cfg.sweep.cleanup_interval());
    sweep_tick.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    cleanup_tick.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = sweep_tick.tick() => {
                match service.run_freshness_sweep().await {
                    Ok(report) => info!(
                        evaluated = report.evaluated,
                        changed = report.changes.len(),
                        "scheduled freshness sweep complete"
                    ),
                    Err(e) => error!(error = %e, "scheduled freshness sweep failed"),
                }
            }
            _ = cleanup_tick.tick() => {
                match service.cleanup_expired_batches().await {
                    Ok(report) => info!(
                        deactivated = report.deactivated.len(),
                        "scheduled expired-batch cleanup complete"
                    ),
                    Err(e) => error!(error = %e, "scheduled expired-batch cleanup failed"),
                }
            }
            _ = signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    match fifo::metrics::gather_text() {
        Ok(text) => info!(metrics = %text, "final metrics snapshot"),
        Err(e) => warn!(error = %e, "could not render metrics"),
    }
    Ok(())
}
