//! Per-table rotation owner.
//!
//! A [`TableRotator`] is the only thing that plans and mutates partitions of
//! its table. Running two against the same table is unsupported: duplicate
//! creates and double drops fail at the storage layer.

use std::sync::Arc;

use chrono::Utc;
use common::config::TableRotationConfig;
use tracing::{debug, info, warn};

use crate::executor::{ApplyReport, PlanExecutor};
use crate::metrics::RotationMetrics;
use crate::planner::{PartitionPlanner, PartitionSpec, PlannerError, ReconciliationPlan, Timestamp};
use crate::store::{PartitionReader, ReadError, TableRef};

#[derive(Debug)]
pub enum TickOutcome {
    /// `now` is still inside the bucket reconciled last time.
    Skipped,
    Applied {
        plan: ReconciliationPlan,
        report: ApplyReport,
    },
}

pub struct TableRotator {
    table: TableRef,
    planner: PartitionPlanner,
    reader: Arc<dyn PartitionReader>,
    executor: PlanExecutor,
    metrics: RotationMetrics,
    backfill_on_start: bool,
}

impl TableRotator {
    pub fn new(
        table: TableRef,
        spec: PartitionSpec,
        reader: Arc<dyn PartitionReader>,
        executor: PlanExecutor,
        metrics: RotationMetrics,
    ) -> Self {
        Self {
            table,
            planner: PartitionPlanner::new(spec),
            reader,
            executor,
            metrics,
            backfill_on_start: false,
        }
    }

    pub fn from_config(
        config: &TableRotationConfig,
        reader: Arc<dyn PartitionReader>,
        executor: PlanExecutor,
        metrics: RotationMetrics,
    ) -> Result<Self, PlannerError> {
        let spec = PartitionSpec::try_from(config)?;
        Ok(Self::new(TableRef::from(config), spec, reader, executor, metrics)
            .with_backfill_on_start(config.backfill_on_start))
    }

    pub fn with_backfill_on_start(mut self, backfill: bool) -> Self {
        self.backfill_on_start = backfill;
        self
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn planner(&self) -> &PartitionPlanner {
        &self.planner
    }

    pub fn metrics(&self) -> &RotationMetrics {
        &self.metrics
    }

    pub fn backfill_on_start(&self) -> bool {
        self.backfill_on_start
    }

    /// Wall-clock now in the table's external unit.
    pub fn now(&self) -> Timestamp {
        self.planner.spec().timestamp_at(Utc::now())
    }

    /// Read the table and plan against it without applying anything.
    pub async fn plan(
        &mut self,
        now: Timestamp,
        include_backfill: bool,
    ) -> Result<ReconciliationPlan, ReadError> {
        let current = self.reader.read(&self.table).await.inspect_err(|e| {
            self.metrics.record_read_failure();
            warn!(table = %self.table, error = %e, "Failed to read partitions");
        })?;

        self.metrics.record_reconciliation();
        let plan = self
            .planner
            .compute_plan(now, &current, include_backfill);

        debug!(
            table = %self.table,
            existing = current.len(),
            to_create = plan.to_create.len(),
            to_delete = plan.to_delete.len(),
            retention_floor = plan.retention_floor,
            window_start = plan.window_start,
            window_end = plan.window_end,
            "Computed reconciliation plan"
        );

        Ok(plan)
    }

    /// One scheduling step: fast-path check, read, plan, apply.
    ///
    /// A backfill request bypasses the fast path. If any operation fails the
    /// cached ceiling is dropped so the next tick reconciles again.
    pub async fn tick(
        &mut self,
        now: Timestamp,
        include_backfill: bool,
    ) -> Result<TickOutcome, ReadError> {
        self.metrics.record_tick();

        if !include_backfill && !self.planner.needs_reconciliation(now) {
            self.metrics.record_tick_skipped();
            debug!(
                table = %self.table,
                now,
                ceiling = self.planner.current_ceiling(),
                "Partition window is current"
            );
            return Ok(TickOutcome::Skipped);
        }

        let plan = self.plan(now, include_backfill).await?;
        let report = self.executor.apply(&self.table, &plan).await;

        if !report.dry_run {
            self.metrics.record_partitions_created(report.created.len());
            self.metrics.record_partitions_dropped(report.dropped.len());
        }
        self.metrics.record_create_failures(report.create_failures());
        self.metrics.record_drop_failures(report.drop_failures());

        if report.is_clean() {
            info!(
                table = %self.table,
                created = report.created.len(),
                dropped = report.dropped.len(),
                dry_run = report.dry_run,
                next_check = self.planner.current_ceiling(),
                "Partition window reconciled"
            );
        } else {
            warn!(
                table = %self.table,
                created = report.created.len(),
                dropped = report.dropped.len(),
                failures = report.failures.len(),
                "Partition window partially reconciled, retrying next tick"
            );
            self.planner.invalidate();
        }

        Ok(TickOutcome::Applied { plan, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::PartitionSet;
    use crate::store::{MockPartitionMutator, MockPartitionReader, MutationError};

    const DAY: i64 = 86400;
    const NOW: Timestamp = 1_700_000_000;

    fn spec() -> PartitionSpec {
        PartitionSpec::new(DAY, DAY * 365, 1, 1, 8 * 3600).unwrap()
    }

    fn rotator(
        reader: MockPartitionReader,
        mutator: MockPartitionMutator,
        metrics: RotationMetrics,
    ) -> TableRotator {
        TableRotator::new(
            TableRef::new("test", "events"),
            spec(),
            Arc::new(reader),
            PlanExecutor::new(Arc::new(mutator), false),
            metrics,
        )
    }

    #[tokio::test]
    async fn test_first_tick_reconciles_then_skips() {
        let mut reader = MockPartitionReader::new();
        reader
            .expect_read()
            .times(1)
            .returning(|_| Ok(PartitionSet::new()));

        let mut mutator = MockPartitionMutator::new();
        mutator.expect_create().times(3).returning(|_, _, _| Ok(()));

        let metrics = RotationMetrics::new();
        let mut rotator = rotator(reader, mutator, metrics.clone());

        let outcome = rotator.tick(NOW, false).await.unwrap();
        match outcome {
            TickOutcome::Applied { plan, report } => {
                assert_eq!(plan.to_create.len(), 3);
                assert_eq!(report.created.len(), 3);
            }
            TickOutcome::Skipped => panic!("first tick must reconcile"),
        }

        // Same bucket: no read
        assert!(matches!(
            rotator.tick(NOW + 60, false).await.unwrap(),
            TickOutcome::Skipped
        ));

        let summary = metrics.summary();
        assert_eq!(summary.ticks, 2);
        assert_eq!(summary.ticks_skipped, 1);
        assert_eq!(summary.reconciliations, 1);
        assert_eq!(summary.partitions_created, 3);
    }

    #[tokio::test]
    async fn test_read_failure_aborts_tick_and_keeps_trigger() {
        let mut reader = MockPartitionReader::new();
        reader.expect_read().times(2).returning(|table| {
            Err(ReadError::Backend {
                table: table.clone(),
                source: "connection refused".into(),
            })
        });

        let mut mutator = MockPartitionMutator::new();
        mutator.expect_create().never();
        mutator.expect_delete().never();

        let metrics = RotationMetrics::new();
        let mut rotator = rotator(reader, mutator, metrics.clone());

        assert!(rotator.tick(NOW, false).await.is_err());
        assert_eq!(rotator.planner().current_ceiling(), 0);
        assert!(rotator.tick(NOW + 1, false).await.is_err());
        assert_eq!(metrics.read_failures(), 2);
    }

    #[tokio::test]
    async fn test_mutation_failure_forces_retry_next_tick() {
        let mut reader = MockPartitionReader::new();
        reader
            .expect_read()
            .times(2)
            .returning(|_| Ok(PartitionSet::new()));

        let mut mutator = MockPartitionMutator::new();
        mutator.expect_create().returning(|table, sequence, _| {
            Err(MutationError::Backend {
                table: table.clone(),
                source: format!("lock wait timeout on p{sequence}").into(),
            })
        });

        let metrics = RotationMetrics::new();
        let mut rotator = rotator(reader, mutator, metrics.clone());

        rotator.tick(NOW, false).await.unwrap();
        assert!(rotator.planner().needs_reconciliation(NOW));

        // Cache was invalidated, so this reads again
        rotator.tick(NOW + 1, false).await.unwrap();
        assert_eq!(metrics.create_failures(), 6);
        assert_eq!(metrics.partitions_created(), 0);
    }

    #[tokio::test]
    async fn test_backfill_bypasses_fast_path() {
        let mut reader = MockPartitionReader::new();
        reader
            .expect_read()
            .times(2)
            .returning(|_| Ok(PartitionSet::new()));

        let mut mutator = MockPartitionMutator::new();
        mutator.expect_create().returning(|_, _, _| Ok(()));

        let mut rotator = rotator(reader, mutator, RotationMetrics::new());

        rotator.tick(NOW, false).await.unwrap();
        let outcome = rotator.tick(NOW, true).await.unwrap();

        match outcome {
            TickOutcome::Applied { plan, .. } => {
                assert_eq!(plan.window_start, plan.retention_floor + 1);
            }
            TickOutcome::Skipped => panic!("backfill must not be skipped"),
        }
    }

    #[tokio::test]
    async fn test_dry_run_does_not_count_as_created() {
        let mut reader = MockPartitionReader::new();
        reader
            .expect_read()
            .returning(|_| Ok(PartitionSet::new()));

        let mut mutator = MockPartitionMutator::new();
        mutator.expect_create().never();

        let metrics = RotationMetrics::new();
        let mut rotator = TableRotator::new(
            TableRef::new("test", "events"),
            spec(),
            Arc::new(reader),
            PlanExecutor::new(Arc::new(mutator), true),
            metrics.clone(),
        );

        rotator.tick(NOW, false).await.unwrap();
        assert_eq!(metrics.partitions_created(), 0);
        assert!(!rotator.planner().needs_reconciliation(NOW));
    }

    #[test]
    fn test_from_config() {
        let config = TableRotationConfig {
            schema: "metrics".to_string(),
            name: "samples".to_string(),
            backfill_on_start: true,
            ..Default::default()
        };

        let rotator = TableRotator::from_config(
            &config,
            Arc::new(MockPartitionReader::new()),
            PlanExecutor::new(Arc::new(MockPartitionMutator::new()), false),
            RotationMetrics::new(),
        )
        .unwrap();

        assert_eq!(rotator.table(), &TableRef::new("metrics", "samples"));
        assert!(rotator.backfill_on_start());
        assert_eq!(rotator.planner().spec().interval_secs(), DAY);
    }
}
