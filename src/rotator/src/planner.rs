//! Rolling window planner for range-partitioned tables.
//!
//! Partitions are fixed-width time buckets. Bucket `i` covers
//! `[i * interval, (i + 1) * interval)` on a clock shifted by a fixed
//! timezone offset; its boundary (the exclusive upper bound) is stored back
//! on the unshifted clock so it compares directly against raw timestamps.
//!
//! The planner only decides. Reading the current partition set and issuing
//! DDL belong to [`crate::store`] and [`crate::executor`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::config::TableRotationConfig;
use thiserror::Error;

/// A point in time in the table's external unit (see [`PartitionSpec::time_unit`]).
pub type Timestamp = i64;

/// Index of a time bucket, `floor(adjusted_seconds / interval)`.
pub type SequenceNumber = i64;

/// Exclusive upper bound of a bucket in the table's external unit.
pub type BoundaryValue = i64;

/// Observed partitions of one table, keyed by sequence number.
pub type PartitionSet = BTreeMap<SequenceNumber, BoundaryValue>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlannerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Immutable window configuration for one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionSpec {
    interval_secs: i64,
    retention_secs: i64,
    time_unit: i64,
    lookahead: u32,
    timezone_offset_secs: i64,
}

impl PartitionSpec {
    /// Validate and build a spec.
    ///
    /// # Errors
    ///
    /// [`PlannerError::InvalidConfiguration`] when the interval or retention is
    /// not positive, or the time unit is below 1.
    pub fn new(
        interval_secs: i64,
        retention_secs: i64,
        time_unit: i64,
        lookahead: u32,
        timezone_offset_secs: i64,
    ) -> Result<Self, PlannerError> {
        if interval_secs <= 0 {
            return Err(PlannerError::InvalidConfiguration(format!(
                "interval must be positive, got {interval_secs}s"
            )));
        }
        if retention_secs <= 0 {
            return Err(PlannerError::InvalidConfiguration(format!(
                "retention must be positive, got {retention_secs}s"
            )));
        }
        if time_unit < 1 {
            return Err(PlannerError::InvalidConfiguration(format!(
                "time unit must be at least 1, got {time_unit}"
            )));
        }

        Ok(Self {
            interval_secs,
            retention_secs,
            time_unit,
            lookahead,
            timezone_offset_secs,
        })
    }

    pub fn interval_secs(&self) -> i64 {
        self.interval_secs
    }

    pub fn retention_secs(&self) -> i64 {
        self.retention_secs
    }

    pub fn time_unit(&self) -> i64 {
        self.time_unit
    }

    pub fn lookahead(&self) -> u32 {
        self.lookahead
    }

    pub fn timezone_offset_secs(&self) -> i64 {
        self.timezone_offset_secs
    }

    /// Bucket containing an external timestamp.
    pub fn bucket_of(&self, ts: Timestamp) -> SequenceNumber {
        self.adjusted_secs(ts).div_euclid(self.interval_secs)
    }

    /// Exclusive upper bound of bucket `sequence`, in the external unit.
    pub fn boundary_of(&self, sequence: SequenceNumber) -> BoundaryValue {
        ((sequence + 1) * self.interval_secs - self.timezone_offset_secs) * self.time_unit
    }

    /// Convert a wall-clock instant into the table's external unit.
    pub fn timestamp_at(&self, instant: DateTime<Utc>) -> Timestamp {
        let scaled = i128::from(instant.timestamp_millis()) * i128::from(self.time_unit) / 1000;
        scaled as Timestamp
    }

    fn adjusted_secs(&self, ts: Timestamp) -> i64 {
        ts.div_euclid(self.time_unit) + self.timezone_offset_secs
    }
}

impl TryFrom<&TableRotationConfig> for PartitionSpec {
    type Error = PlannerError;

    fn try_from(config: &TableRotationConfig) -> Result<Self, Self::Error> {
        let secs = |what: &str, d: Duration| {
            i64::try_from(d.as_secs()).map_err(|_| {
                PlannerError::InvalidConfiguration(format!("{what} {d:?} is out of range"))
            })
        };

        PartitionSpec::new(
            secs("interval", config.interval)?,
            secs("retention", config.retention)?,
            i64::from(config.time_unit),
            config.lookahead,
            config.timezone_offset_secs,
        )
    }
}

impl fmt::Display for PartitionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let human = |secs: i64| humantime::format_duration(Duration::from_secs(secs.unsigned_abs()));
        write!(
            f,
            "interval={}, retention={}, unit={}, lookahead={}, tz_offset={}s",
            human(self.interval_secs),
            human(self.retention_secs),
            self.time_unit,
            self.lookahead,
            self.timezone_offset_secs
        )
    }
}

/// A bucket the planner wants created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedPartition {
    pub sequence: SequenceNumber,
    pub boundary: BoundaryValue,
}

/// Outcome of one planning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationPlan {
    /// Missing buckets, ascending by sequence number.
    pub to_create: Vec<PlannedPartition>,
    /// Existing buckets below the retention floor.
    pub to_delete: BTreeSet<SequenceNumber>,
    /// Buckets strictly below this one are expired.
    pub retention_floor: SequenceNumber,
    /// First bucket considered for creation.
    pub window_start: SequenceNumber,
    /// Last bucket considered for creation.
    pub window_end: SequenceNumber,
}

impl ReconciliationPlan {
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_delete.is_empty()
    }
}

/// Decides which partitions to add and drop for one table.
///
/// Besides its spec the planner caches the boundary of the bucket containing
/// "now" at the last planning pass. The cache only answers
/// [`needs_reconciliation`](Self::needs_reconciliation); it never stands in
/// for the observed partition set.
#[derive(Debug, Clone)]
pub struct PartitionPlanner {
    spec: PartitionSpec,
    current_ceiling: Timestamp,
}

impl PartitionPlanner {
    pub fn new(spec: PartitionSpec) -> Self {
        Self {
            spec,
            current_ceiling: 0,
        }
    }

    pub fn spec(&self) -> &PartitionSpec {
        &self.spec
    }

    /// Boundary of the current bucket as of the last plan, zero before the first.
    pub fn current_ceiling(&self) -> Timestamp {
        self.current_ceiling
    }

    /// Cheap trigger check run on every tick before reading state.
    pub fn needs_reconciliation(&self, now: Timestamp) -> bool {
        now >= self.current_ceiling
    }

    /// Forget the cached ceiling so the next tick reconciles again.
    pub fn invalidate(&mut self) {
        self.current_ceiling = 0;
    }

    /// Compute what to create and drop given the observed partitions.
    ///
    /// With `include_backfill` every missing bucket from just above the
    /// retention floor up to the end of the look-ahead window is planned,
    /// otherwise only `lookahead` buckets on each side of the current one.
    /// Presence is decided by sequence number alone; a bucket stored with a
    /// different boundary is left untouched.
    pub fn compute_plan(
        &mut self,
        now: Timestamp,
        current: &PartitionSet,
        include_backfill: bool,
    ) -> ReconciliationPlan {
        let interval = self.spec.interval_secs;
        let adjusted = self.spec.adjusted_secs(now);
        let current_bucket = adjusted.div_euclid(interval);
        let lookahead = i64::from(self.spec.lookahead);

        // One bucket of slack below the nominal floor so alignment never
        // drops a partition that still holds data inside retention.
        let retention_floor = (adjusted - self.spec.retention_secs).div_euclid(interval) - 1;

        let window_start = if include_backfill {
            retention_floor + 1
        } else {
            current_bucket - lookahead
        };
        let window_end = current_bucket + lookahead;

        let to_create = (window_start..=window_end)
            .filter(|sequence| !current.contains_key(sequence))
            .map(|sequence| PlannedPartition {
                sequence,
                boundary: self.spec.boundary_of(sequence),
            })
            .collect();

        let to_delete = current
            .keys()
            .copied()
            .filter(|&sequence| sequence < retention_floor)
            .collect();

        self.current_ceiling = self.spec.boundary_of(current_bucket);

        ReconciliationPlan {
            to_create,
            to_delete,
            retention_floor,
            window_start,
            window_end,
        }
    }
}
