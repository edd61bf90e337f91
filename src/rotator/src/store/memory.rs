use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{MutationError, PartitionMutator, PartitionReader, ReadError, TableRef};
use crate::planner::{BoundaryValue, PartitionSet, SequenceNumber};

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<TableRef, PartitionSet>,
    /// (table, sequence) pairs whose DDL always fails, for failure injection
    rejected: HashSet<(TableRef, SequenceNumber)>,
    unreadable: HashSet<TableRef>,
}

/// In-process partition store.
///
/// Behaves like a range-partitioned table on a real server as far as the
/// rotator can tell: duplicate creates and drops of missing partitions fail.
/// Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPartitionStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryPartitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table with no partitions.
    pub async fn create_table(&self, table: TableRef) {
        self.inner.write().await.tables.entry(table).or_default();
    }

    /// Seed a partition directly, bypassing failure injection.
    pub async fn insert(&self, table: &TableRef, sequence: SequenceNumber, boundary: BoundaryValue) {
        self.inner
            .write()
            .await
            .tables
            .entry(table.clone())
            .or_default()
            .insert(sequence, boundary);
    }

    /// Current partitions of a table, `None` if it was never registered.
    pub async fn partitions(&self, table: &TableRef) -> Option<PartitionSet> {
        self.inner.read().await.tables.get(table).cloned()
    }

    /// Make every create or delete of `sequence` on `table` fail.
    pub async fn reject(&self, table: &TableRef, sequence: SequenceNumber) {
        self.inner
            .write()
            .await
            .rejected
            .insert((table.clone(), sequence));
    }

    /// Undo all injected failures.
    pub async fn heal(&self) {
        let mut inner = self.inner.write().await;
        inner.rejected.clear();
        inner.unreadable.clear();
    }

    /// Make reads of `table` fail.
    pub async fn make_unreadable(&self, table: &TableRef) {
        self.inner.write().await.unreadable.insert(table.clone());
    }
}

fn injected(table: &TableRef, sequence: SequenceNumber) -> MutationError {
    MutationError::Backend {
        table: table.clone(),
        source: format!("injected failure for p{sequence}").into(),
    }
}

#[async_trait]
impl PartitionReader for InMemoryPartitionStore {
    async fn read(&self, table: &TableRef) -> Result<PartitionSet, ReadError> {
        let inner = self.inner.read().await;

        if inner.unreadable.contains(table) {
            return Err(ReadError::Backend {
                table: table.clone(),
                source: "injected read failure".into(),
            });
        }

        inner
            .tables
            .get(table)
            .cloned()
            .ok_or_else(|| ReadError::UnknownTable(table.clone()))
    }
}

#[async_trait]
impl PartitionMutator for InMemoryPartitionStore {
    async fn create(
        &self,
        table: &TableRef,
        sequence: SequenceNumber,
        boundary: BoundaryValue,
    ) -> Result<(), MutationError> {
        let mut inner = self.inner.write().await;

        if inner.rejected.contains(&(table.clone(), sequence)) {
            return Err(injected(table, sequence));
        }

        let partitions = inner
            .tables
            .get_mut(table)
            .ok_or_else(|| MutationError::UnknownTable(table.clone()))?;

        if partitions.contains_key(&sequence) {
            return Err(MutationError::AlreadyExists {
                table: table.clone(),
                sequence,
            });
        }

        partitions.insert(sequence, boundary);
        Ok(())
    }

    async fn delete(&self, table: &TableRef, sequence: SequenceNumber) -> Result<(), MutationError> {
        let mut inner = self.inner.write().await;

        if inner.rejected.contains(&(table.clone(), sequence)) {
            return Err(injected(table, sequence));
        }

        let partitions = inner
            .tables
            .get_mut(table)
            .ok_or_else(|| MutationError::UnknownTable(table.clone()))?;

        partitions
            .remove(&sequence)
            .map(|_| ())
            .ok_or_else(|| MutationError::NotFound {
                table: table.clone(),
                sequence,
            })
    }
}
