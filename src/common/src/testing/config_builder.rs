//! Test configuration builder for creating test setups quickly.

use std::time::Duration;

use crate::config::{Configuration, TableRotationConfig};

/// Builder for whole test configurations.
///
/// # Example
///
/// ```rust,ignore
/// use common::testing::{TestConfigBuilder, TestTableBuilder};
///
/// let config = TestConfigBuilder::new()
///     .dry_run(true)
///     .with_table(TestTableBuilder::daily("test", "events").lookahead(2).build())
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct TestConfigBuilder {
    config: Configuration,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestConfigBuilder {
    /// Defaults with a fast tick so service tests don't wait around.
    pub fn new() -> Self {
        let mut config = Configuration::default();
        config.rotator.tick_interval = Duration::from_millis(50);
        Self { config }
    }

    pub fn with_dsn(mut self, dsn: impl Into<String>) -> Self {
        self.config.database.dsn = dsn.into();
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.config.rotator.dry_run = dry_run;
        self
    }

    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.config.rotator.tick_interval = interval;
        self
    }

    pub fn with_table(mut self, table: TableRotationConfig) -> Self {
        self.config.rotator.tables.push(table);
        self
    }

    pub fn build(self) -> Configuration {
        self.config
    }
}

/// Builder for a single table entry.
#[derive(Debug, Clone)]
pub struct TestTableBuilder {
    table: TableRotationConfig,
}

impl TestTableBuilder {
    /// Daily partitions, one year retention, the historical UTC+8 offset.
    pub fn daily(schema: &str, name: &str) -> Self {
        Self {
            table: TableRotationConfig {
                schema: schema.to_string(),
                name: name.to_string(),
                ..Default::default()
            },
        }
    }

    /// Hourly partitions in UTC with one day retention.
    pub fn hourly(schema: &str, name: &str) -> Self {
        Self::daily(schema, name)
            .interval(Duration::from_secs(3600))
            .retention(Duration::from_secs(86400))
            .timezone_offset_secs(0)
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.table.interval = interval;
        self
    }

    pub fn retention(mut self, retention: Duration) -> Self {
        self.table.retention = retention;
        self
    }

    pub fn time_unit(mut self, time_unit: u32) -> Self {
        self.table.time_unit = time_unit;
        self
    }

    pub fn lookahead(mut self, lookahead: u32) -> Self {
        self.table.lookahead = lookahead;
        self
    }

    pub fn timezone_offset_secs(mut self, offset: i64) -> Self {
        self.table.timezone_offset_secs = offset;
        self
    }

    pub fn backfill_on_start(mut self, backfill: bool) -> Self {
        self.table.backfill_on_start = backfill;
        self
    }

    pub fn build(self) -> TableRotationConfig {
        self.table
    }
}
