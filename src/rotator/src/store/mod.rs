//! Partition stores: where the observed partition set comes from and where
//! planned DDL goes.
//!
//! Two backends ship with the crate:
//! - `memory`: in-process tables, for tests and local experiments
//! - `mysql`: `INFORMATION_SCHEMA` introspection and `ALTER TABLE` DDL

use std::fmt;

use async_trait::async_trait;
use common::config::TableRotationConfig;
use thiserror::Error;

use crate::planner::{BoundaryValue, PartitionSet, SequenceNumber};

pub mod memory;
pub mod mysql;

pub use memory::InMemoryPartitionStore;
pub use mysql::MySqlPartitionStore;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Fully qualified table identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl From<&TableRotationConfig> for TableRef {
    fn from(config: &TableRotationConfig) -> Self {
        Self::new(&config.schema, &config.name)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Failure to observe a table's partitions. Aborts the tick for that table.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("Table {0} does not exist")]
    UnknownTable(TableRef),

    #[error("Failed to read partitions of {table}: {source}")]
    Backend {
        table: TableRef,
        #[source]
        source: BoxError,
    },
}

/// Failure of a single create or delete. Never aborts the rest of a plan.
#[derive(Error, Debug)]
pub enum MutationError {
    #[error("Table {0} does not exist")]
    UnknownTable(TableRef),

    #[error("Partition p{sequence} already exists on {table}")]
    AlreadyExists {
        table: TableRef,
        sequence: SequenceNumber,
    },

    #[error("Partition p{sequence} does not exist on {table}")]
    NotFound {
        table: TableRef,
        sequence: SequenceNumber,
    },

    #[error("Statement on {table} failed: {source}")]
    Backend {
        table: TableRef,
        #[source]
        source: BoxError,
    },
}

/// Returns the current partition set of a table.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PartitionReader: Send + Sync {
    async fn read(&self, table: &TableRef) -> Result<PartitionSet, ReadError>;
}

/// Adds or drops one partition at a time.
///
/// Calls are independent. Creating a partition that exists, or dropping one
/// that doesn't, is an error at this layer; callers avoid both by planning
/// against a fresh read.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PartitionMutator: Send + Sync {
    async fn create(
        &self,
        table: &TableRef,
        sequence: SequenceNumber,
        boundary: BoundaryValue,
    ) -> Result<(), MutationError>;

    async fn delete(&self, table: &TableRef, sequence: SequenceNumber)
    -> Result<(), MutationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_ref_display() {
        let table = TableRef::new("test", "partition_test");
        assert_eq!(table.to_string(), "test.partition_test");
    }

    #[test]
    fn test_table_ref_from_config() {
        let config = TableRotationConfig {
            schema: "metrics".to_string(),
            name: "samples".to_string(),
            ..Default::default()
        };
        assert_eq!(TableRef::from(&config), TableRef::new("metrics", "samples"));
    }

    #[test]
    fn test_error_messages_name_the_partition() {
        let err = MutationError::AlreadyExists {
            table: TableRef::new("db", "t"),
            sequence: 19676,
        };
        assert_eq!(err.to_string(), "Partition p19676 already exists on db.t");
    }
}
