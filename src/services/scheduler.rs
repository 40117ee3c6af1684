use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::context::AppContext;
use crate::models::{EntityType, SyncResult};

/// Spawns one periodic sync task per entity type. Each stops when `shutdown` turns true.
pub fn spawn_sync_tasks(ctx: Arc<AppContext>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
    EntityType::ALL
        .into_iter()
        .map(|entity| {
            let period = match entity {
                EntityType::Teams => ctx.config.teams_interval,
                EntityType::Matches => ctx.config.matches_interval,
            };
            spawn_periodic_sync(ctx.clone(), entity, period, shutdown.clone())
        })
        .collect()
}

fn spawn_periodic_sync(
    ctx: Arc<AppContext>,
    entity: EntityType,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // The startup sync covers the first run.
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!("Scheduled {} sync every {} minutes", entity, period.as_secs() / 60);
        let cancel = shutdown.clone();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    ctx.run_sync_with_cancel(entity, false, &cancel).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("{} sync task stopped", entity);
    })
}

/// One full sync at boot. The store was already opened by
/// [`AppContext::connect_with_startup_retry`], so this only honours the refresh interval.
pub async fn startup_sync(ctx: &AppContext) -> Vec<SyncResult> {
    tracing::info!("Running startup sync");
    ctx.sync_all(false).await
}
