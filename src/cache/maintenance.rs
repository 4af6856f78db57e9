//! Background cache maintenance.
//!
//! Two loops run outside the per-query path: a periodic TTL sweep and a
//! once-daily purge of entries dated before today. Both stop through a single
//! handle; the purge's once-per-day guard lives in the integrator, so a
//! re-spawned or re-triggered job cannot run twice on the same date.

use super::CacheIntegrator;
use crate::config::EngineConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Stoppable handle over the maintenance tasks.
pub struct MaintenanceHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl MaintenanceHandle {
    /// Signal both loops and wait for them to wind down.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if task.await.is_err() {
                warn!("maintenance task aborted uncleanly");
            }
        }
        info!("cache maintenance stopped");
    }
}

/// Spawn the sweep and purge loops.
pub fn spawn_maintenance(
    integrator: Arc<CacheIntegrator>,
    config: &EngineConfig,
) -> MaintenanceHandle {
    let (shutdown, _) = watch::channel(false);

    let sweep_task = {
        let integrator = integrator.clone();
        let mut rx = shutdown.subscribe();
        let period = Duration::from_secs(config.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match integrator.sweep_expired().await {
                            Ok(removed) if removed > 0 => {
                                debug!(removed, "cache sweep pass");
                            }
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "cache sweep failed"),
                        }
                    }
                    _ = rx.changed() => break,
                }
            }
        })
    };

    let purge_task = {
        let integrator = integrator.clone();
        let mut rx = shutdown.subscribe();
        let period = Duration::from_secs(config.purge_check_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // The integrator's last-purge marker makes repeated
                        // same-day ticks no-ops.
                        match integrator.daily_purge().await {
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "daily cache purge failed"),
                        }
                    }
                    _ = rx.changed() => break,
                }
            }
        })
    };

    MaintenanceHandle {
        shutdown,
        tasks: vec![sweep_task, purge_task],
    }
}
