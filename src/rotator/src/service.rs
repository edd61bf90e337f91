//! Rotation service: one background task per managed table.

use std::sync::Arc;
use std::time::Duration;

use common::config::Configuration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::error::RotatorError;
use crate::executor::PlanExecutor;
use crate::metrics::RotationMetrics;
use crate::rotation::{TableRotator, TickOutcome};
use crate::store::{PartitionMutator, PartitionReader, ReadError, TableRef};

/// Build one rotator per configured table, all sharing `store` and `metrics`.
pub fn rotators_from_config<S>(
    config: &Configuration,
    store: Arc<S>,
    metrics: &RotationMetrics,
) -> Result<Vec<TableRotator>, RotatorError>
where
    S: PartitionReader + PartitionMutator + 'static,
{
    config.validate()?;

    let executor = PlanExecutor::new(store.clone(), config.rotator.dry_run);

    config
        .rotator
        .tables
        .iter()
        .map(|table| {
            TableRotator::from_config(table, store.clone(), executor.clone(), metrics.clone())
                .map_err(RotatorError::from)
        })
        .collect()
}

/// Run a single reconciliation pass for every rotator, one after another.
pub async fn run_once(
    rotators: &mut [TableRotator],
    include_backfill: bool,
) -> Vec<(TableRef, Result<TickOutcome, ReadError>)> {
    let mut results = Vec::with_capacity(rotators.len());

    for rotator in rotators.iter_mut() {
        let now = rotator.now();
        let outcome = rotator.tick(now, include_backfill).await;
        results.push((rotator.table().clone(), outcome));
    }

    results
}

/// Owns the per-table rotation tasks.
pub struct RotationService {
    tasks: Vec<(TableRef, JoinHandle<()>)>,
    metrics: RotationMetrics,
}

impl RotationService {
    /// Spawn one task per rotator, each ticking every `tick_interval`.
    pub fn spawn(
        rotators: Vec<TableRotator>,
        tick_interval: Duration,
        metrics: RotationMetrics,
    ) -> Self {
        let tasks = rotators
            .into_iter()
            .map(|rotator| {
                let table = rotator.table().clone();
                info!(table = %table, spec = %rotator.planner().spec(), "Starting table rotation");
                (table, tokio::spawn(rotate_forever(rotator, tick_interval)))
            })
            .collect();

        Self { tasks, metrics }
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableRef> {
        self.tasks.iter().map(|(table, _)| table)
    }

    pub fn metrics(&self) -> &RotationMetrics {
        &self.metrics
    }

    /// Stop every task and wait for them to wind down.
    pub async fn shutdown(self) {
        for (table, handle) in self.tasks {
            handle.abort();
            match handle.await {
                Err(e) if !e.is_cancelled() => {
                    warn!(table = %table, error = %e, "Rotation task ended abnormally");
                }
                _ => debug!(table = %table, "Rotation task stopped"),
            }
        }
    }
}

async fn rotate_forever(mut rotator: TableRotator, tick_interval: Duration) {
    let mut ticker = interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Cleared after the first tick whose read succeeds.
    let mut pending_backfill = rotator.backfill_on_start();

    loop {
        ticker.tick().await;

        let now = rotator.now();
        match rotator.tick(now, pending_backfill).await {
            Ok(TickOutcome::Skipped) => {}
            Ok(TickOutcome::Applied { .. }) => {
                pending_backfill = false;
                debug!(
                    table = %rotator.table(),
                    ceiling = rotator.planner().current_ceiling(),
                    "Next reconciliation when the clock reaches the ceiling"
                );
                rotator.metrics().summary().log();
            }
            Err(e) => {
                warn!(table = %rotator.table(), error = %e, "Rotation tick failed, retrying next tick");
            }
        }
    }
}
