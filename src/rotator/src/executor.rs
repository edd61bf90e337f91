//! Applies a [`ReconciliationPlan`] through a [`PartitionMutator`].
//!
//! Every operation is attempted even when earlier ones fail. Nothing is
//! rolled back: the next tick re-reads the table and plans again, and
//! planning against observed state is idempotent.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::planner::{BoundaryValue, ReconciliationPlan, SequenceNumber};
use crate::store::{MutationError, PartitionMutator, TableRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionOperation {
    Create {
        sequence: SequenceNumber,
        boundary: BoundaryValue,
    },
    Delete {
        sequence: SequenceNumber,
    },
}

impl fmt::Display for PartitionOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionOperation::Create { sequence, boundary } => {
                write!(f, "create p{sequence} < {boundary}")
            }
            PartitionOperation::Delete { sequence } => write!(f, "drop p{sequence}"),
        }
    }
}

#[derive(Debug)]
pub struct OperationFailure {
    pub operation: PartitionOperation,
    pub error: MutationError,
}

/// What happened while applying one plan.
///
/// In dry-run mode `created` and `dropped` list what would have been applied.
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub created: Vec<SequenceNumber>,
    pub dropped: Vec<SequenceNumber>,
    pub failures: Vec<OperationFailure>,
    pub dry_run: bool,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn create_failures(&self) -> usize {
        self.failures
            .iter()
            .filter(|f| matches!(f.operation, PartitionOperation::Create { .. }))
            .count()
    }

    pub fn drop_failures(&self) -> usize {
        self.failures.len() - self.create_failures()
    }
}

#[derive(Clone)]
pub struct PlanExecutor {
    mutator: Arc<dyn PartitionMutator>,
    dry_run: bool,
}

impl fmt::Debug for PlanExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanExecutor")
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

impl PlanExecutor {
    pub fn new(mutator: Arc<dyn PartitionMutator>, dry_run: bool) -> Self {
        Self { mutator, dry_run }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Creates first (ascending), then drops.
    pub async fn apply(&self, table: &TableRef, plan: &ReconciliationPlan) -> ApplyReport {
        let mut report = ApplyReport {
            dry_run: self.dry_run,
            ..Default::default()
        };

        for partition in &plan.to_create {
            let operation = PartitionOperation::Create {
                sequence: partition.sequence,
                boundary: partition.boundary,
            };

            if self.dry_run {
                info!(table = %table, "Dry run: would {operation}");
                report.created.push(partition.sequence);
                continue;
            }

            match self
                .mutator
                .create(table, partition.sequence, partition.boundary)
                .await
            {
                Ok(()) => report.created.push(partition.sequence),
                Err(error) => {
                    warn!(table = %table, error = %error, "Failed to {operation}");
                    report.failures.push(OperationFailure { operation, error });
                }
            }
        }

        for &sequence in &plan.to_delete {
            let operation = PartitionOperation::Delete { sequence };

            if self.dry_run {
                info!(table = %table, "Dry run: would {operation}");
                report.dropped.push(sequence);
                continue;
            }

            match self.mutator.delete(table, sequence).await {
                Ok(()) => report.dropped.push(sequence),
                Err(error) => {
                    warn!(table = %table, error = %error, "Failed to {operation}");
                    report.failures.push(OperationFailure { operation, error });
                }
            }
        }

        report
    }
}
