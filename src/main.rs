//! Lifecycle sweeper daemon.
//!
//! Polls the shared store on an interval: schedules cleanup for rooms gone
//! inactive, executes due cleanup tasks, and runs the TTL sweep for pools
//! whose scheduled cleanup never happened.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tracing_subscriber::EnvFilter;

use matchroom::models::CleanupReason;
use matchroom::services::LifecycleManager;
use matchroom::store::RedisStore;
use matchroom::{Config, SystemClock};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let store = Arc::new(RedisStore::connect(&config.redis_url)?);
    let lifecycle = LifecycleManager::new(
        store,
        Arc::new(SystemClock),
        config.cleanup_retry_base_secs,
    );

    tracing::info!(
        interval_secs = config.sweep_interval_secs,
        "Lifecycle sweeper started"
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(config.sweep_interval_secs));
    loop {
        ticker.tick().await;
        run_pass(&lifecycle, config.inactivity_threshold_hours).await;
    }
}

async fn run_pass(lifecycle: &LifecycleManager<RedisStore>, inactivity_threshold_hours: i64) {
    match lifecycle.check_inactive_rooms(inactivity_threshold_hours).await {
        Ok(rooms) => {
            for room_id in rooms {
                if let Err(error) = lifecycle
                    .schedule_cleanup(&room_id, ChronoDuration::zero(), CleanupReason::Inactive)
                    .await
                {
                    tracing::error!(room_id = %room_id, %error, "Failed to schedule inactive cleanup");
                }
            }
        }
        Err(error) => tracing::error!(%error, "Inactive room check failed"),
    }

    match lifecycle.process_due_tasks().await {
        Ok(outcomes) if !outcomes.is_empty() => {
            tracing::info!(tasks = outcomes.len(), "Processed due cleanup tasks");
        }
        Ok(_) => {}
        Err(error) => tracing::error!(%error, "Due task processing failed"),
    }

    match lifecycle.process_ttl_sweep().await {
        Ok(cleaned) if !cleaned.is_empty() => {
            tracing::info!(rooms = cleaned.len(), "TTL sweep reclaimed pools");
        }
        Ok(_) => {}
        Err(error) => tracing::error!(%error, "TTL sweep failed"),
    }
}
