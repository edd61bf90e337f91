//! MySQL range-partition backend.
//!
//! Partitions are named `p<sequence>` and declared with
//! `VALUES LESS THAN (<boundary>)`, so `INFORMATION_SCHEMA.PARTITIONS` gives
//! back exactly the (sequence, boundary) pairs the planner works with.

use async_trait::async_trait;
use sqlx::mysql::{MySqlDatabaseError, MySqlPool};
use sqlx::Row;
use tracing::{info, warn};

use super::{MutationError, PartitionMutator, PartitionReader, ReadError, TableRef};
use crate::planner::{BoundaryValue, PartitionSet, SequenceNumber};

/// ER_SAME_NAME_PARTITION
const ER_SAME_NAME_PARTITION: u16 = 1517;
/// ER_DROP_PARTITION_NON_EXISTENT
const ER_DROP_PARTITION_NON_EXISTENT: u16 = 1507;

const LIST_PARTITIONS: &str = r#"
    SELECT CAST(PARTITION_NAME AS CHAR) AS partition_name,
           CAST(PARTITION_DESCRIPTION AS CHAR) AS partition_description
    FROM INFORMATION_SCHEMA.PARTITIONS
    WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
"#;

#[derive(Debug, Clone)]
pub struct MySqlPartitionStore {
    pool: MySqlPool,
}

impl MySqlPartitionStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn connect(dsn: &str) -> Result<Self, sqlx::Error> {
        let pool = MySqlPool::connect(dsn).await.map_err(|e| {
            log::error!("Failed to connect to MySQL: {e}");
            e
        })?;
        log::info!("Database connection established successfully");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

fn quote_ident(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

fn qualified(table: &TableRef) -> String {
    format!("{}.{}", quote_ident(&table.schema), quote_ident(&table.name))
}

pub fn partition_name(sequence: SequenceNumber) -> String {
    format!("p{sequence}")
}

pub fn parse_partition_name(name: &str) -> Option<SequenceNumber> {
    name.strip_prefix('p')?.parse().ok()
}

pub fn add_partition_sql(
    table: &TableRef,
    sequence: SequenceNumber,
    boundary: BoundaryValue,
) -> String {
    format!(
        "ALTER TABLE {} ADD PARTITION (PARTITION {} VALUES LESS THAN ({boundary}) ENGINE = InnoDB)",
        qualified(table),
        quote_ident(&partition_name(sequence)),
    )
}

pub fn drop_partition_sql(table: &TableRef, sequence: SequenceNumber) -> String {
    format!(
        "ALTER TABLE {} DROP PARTITION {}",
        qualified(table),
        quote_ident(&partition_name(sequence)),
    )
}

/// MySQL server error number, if the error came from the server.
fn server_error_number(err: &sqlx::Error) -> Option<u16> {
    match err {
        sqlx::Error::Database(db) => db
            .try_downcast_ref::<MySqlDatabaseError>()
            .map(MySqlDatabaseError::number),
        _ => None,
    }
}

/// Turn introspection rows into a partition set, skipping anything that is
/// not a `p<int>` partition with a numeric bound (unpartitioned placeholder
/// rows, `MAXVALUE` catch-alls, hand-made partitions).
pub fn collect_partitions(
    table: &TableRef,
    rows: impl IntoIterator<Item = (Option<String>, Option<String>)>,
) -> PartitionSet {
    let mut partitions = PartitionSet::new();

    for (name, description) in rows {
        let Some(name) = name else {
            continue;
        };

        let Some(sequence) = parse_partition_name(&name) else {
            warn!(table = %table, partition = %name, "Ignoring partition with unrecognized name");
            continue;
        };

        match description.as_deref().map(str::parse::<BoundaryValue>) {
            Some(Ok(boundary)) => {
                partitions.insert(sequence, boundary);
            }
            _ => {
                warn!(
                    table = %table,
                    partition = %name,
                    description = ?description,
                    "Ignoring partition without a numeric upper bound"
                );
            }
        }
    }

    partitions
}

#[async_trait]
impl PartitionReader for MySqlPartitionStore {
    async fn read(&self, table: &TableRef) -> Result<PartitionSet, ReadError> {
        let rows = sqlx::query(LIST_PARTITIONS)
            .bind(&table.schema)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ReadError::Backend {
                table: table.clone(),
                source: Box::new(e),
            })?;

        if rows.is_empty() {
            return Err(ReadError::UnknownTable(table.clone()));
        }

        let pairs = rows
            .iter()
            .map(|row| -> Result<(Option<String>, Option<String>), sqlx::Error> {
                Ok((
                    row.try_get("partition_name")?,
                    row.try_get("partition_description")?,
                ))
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ReadError::Backend {
                table: table.clone(),
                source: Box::new(e),
            })?;

        Ok(collect_partitions(table, pairs))
    }
}

#[async_trait]
impl PartitionMutator for MySqlPartitionStore {
    async fn create(
        &self,
        table: &TableRef,
        sequence: SequenceNumber,
        boundary: BoundaryValue,
    ) -> Result<(), MutationError> {
        let sql = add_partition_sql(table, sequence, boundary);

        match sqlx::raw_sql(&sql).execute(&self.pool).await {
            Ok(_) => {
                info!(table = %table, sequence, boundary, "Added partition [{sql}]");
                Ok(())
            }
            Err(e) => {
                warn!(table = %table, sequence, boundary, error = %e, "Failed to add partition [{sql}]");
                if server_error_number(&e) == Some(ER_SAME_NAME_PARTITION) {
                    return Err(MutationError::AlreadyExists {
                        table: table.clone(),
                        sequence,
                    });
                }
                Err(MutationError::Backend {
                    table: table.clone(),
                    source: Box::new(e),
                })
            }
        }
    }

    async fn delete(&self, table: &TableRef, sequence: SequenceNumber) -> Result<(), MutationError> {
        let sql = drop_partition_sql(table, sequence);

        match sqlx::raw_sql(&sql).execute(&self.pool).await {
            Ok(_) => {
                info!(table = %table, sequence, "Dropped partition [{sql}]");
                Ok(())
            }
            Err(e) => {
                warn!(table = %table, sequence, error = %e, "Failed to drop partition [{sql}]");
                if server_error_number(&e) == Some(ER_DROP_PARTITION_NON_EXISTENT) {
                    return Err(MutationError::NotFound {
                        table: table.clone(),
                        sequence,
                    });
                }
                Err(MutationError::Backend {
                    table: table.clone(),
                    source: Box::new(e),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TableRef {
        TableRef::new("test", "partition_test")
    }

    #[test]
    fn test_partition_names() {
        assert_eq!(partition_name(19676), "p19676");
        assert_eq!(parse_partition_name("p19676"), Some(19676));
        assert_eq!(parse_partition_name("p0"), Some(0));
        assert_eq!(parse_partition_name("pmax"), None);
        assert_eq!(parse_partition_name("19676"), None);
        assert_eq!(parse_partition_name("p"), None);
    }

    #[test]
    fn test_add_partition_sql() {
        assert_eq!(
            add_partition_sql(&table(), 19676, 1700064000),
            "ALTER TABLE `test`.`partition_test` ADD PARTITION (PARTITION `p19676` VALUES LESS THAN (1700064000) ENGINE = InnoDB)"
        );
    }

    #[test]
    fn test_drop_partition_sql() {
        assert_eq!(
            drop_partition_sql(&table(), 0),
            "ALTER TABLE `test`.`partition_test` DROP PARTITION `p0`"
        );
    }

    #[test]
    fn test_identifiers_are_escaped() {
        let nasty = TableRef::new("db", "we`ird");
        assert_eq!(
            drop_partition_sql(&nasty, 1),
            "ALTER TABLE `db`.`we``ird` DROP PARTITION `p1`"
        );
    }

    #[test]
    fn test_collect_partitions_skips_unusable_rows() {
        let rows = vec![
            (Some("p0".to_string()), Some("0".to_string())),
            (Some("p19676".to_string()), Some("1700064000".to_string())),
            (Some("pmax".to_string()), Some("MAXVALUE".to_string())),
            (Some("p19677".to_string()), Some("MAXVALUE".to_string())),
            (None, None),
        ];

        let partitions = collect_partitions(&table(), rows);
        assert_eq!(
            partitions,
            PartitionSet::from([(0, 0), (19676, 1700064000)])
        );
    }
}
