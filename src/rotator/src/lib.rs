//! Partkeeper rotator library
//!
//! Keeps time-range partitioned tables inside a rolling window: partitions
//! are created ahead of the clock and dropped once they fall out of the
//! retention horizon.
//!
//! - [`planner`] is the pure arithmetic: buckets, boundaries, and the diff
//!   between the desired window and what the table holds.
//! - [`store`] reads and mutates partitions (MySQL, or in memory for tests).
//! - [`executor`] applies a plan best-effort.
//! - [`rotation`] ties those together for one table, [`service`] runs one
//!   task per configured table.

pub mod error;
pub mod executor;
pub mod metrics;
pub mod planner;
pub mod rotation;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use error::RotatorError;
pub use executor::{ApplyReport, OperationFailure, PartitionOperation, PlanExecutor};
pub use metrics::{MetricsSummary, RotationMetrics};
pub use planner::{
    BoundaryValue, PartitionPlanner, PartitionSet, PartitionSpec, PlannedPartition, PlannerError,
    ReconciliationPlan, SequenceNumber, Timestamp,
};
pub use rotation::{TableRotator, TickOutcome};
pub use service::{RotationService, rotators_from_config, run_once};
pub use store::{
    InMemoryPartitionStore, MutationError, MySqlPartitionStore, PartitionMutator, PartitionReader,
    ReadError, TableRef,
};
