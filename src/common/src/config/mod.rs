use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "partkeeper.toml";

/// Prefix for environment overrides, nested keys are separated by `__`.
pub const ENV_PREFIX: &str = "PARTKEEPER__";

/// Historical convention: partition boundaries are aligned to UTC+8 midnight.
pub const DEFAULT_TIMEZONE_OFFSET_SECS: i64 = 8 * 60 * 60;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// MySQL DSN of the server holding the partitioned tables
    ///
    /// Env: PARTKEEPER__DATABASE__DSN
    pub dsn: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dsn: String::from("mysql://root@127.0.0.1:3306/test"),
        }
    }
}

/// Rotation service settings shared by every managed table.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RotatorConfig {
    /// Run the rotation loop at all.
    ///
    /// Env: PARTKEEPER__ROTATOR__ENABLED
    pub enabled: bool,

    /// How often each table owner wakes up and checks its window.
    ///
    /// Env: PARTKEEPER__ROTATOR__TICK_INTERVAL
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,

    /// Log planned DDL without executing it.
    ///
    /// Env: PARTKEEPER__ROTATOR__DRY_RUN
    pub dry_run: bool,

    /// Tables under rotation. Each one gets its own independent owner.
    pub tables: Vec<TableRotationConfig>,
}

impl Default for RotatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval: Duration::from_secs(60),
            dry_run: false,
            tables: Vec::new(),
        }
    }
}

/// Rolling window settings for a single range-partitioned table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableRotationConfig {
    /// Database (schema) containing the table.
    pub schema: String,

    /// Table name.
    pub name: String,

    /// Width of one partition.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// How far back partitions are kept.
    #[serde(with = "humantime_serde")]
    pub retention: Duration,

    /// Divisor from the partitioning column's unit to seconds
    /// (1 for seconds, 1000 for milliseconds).
    pub time_unit: u32,

    /// Partitions pre-created on each side of the current one.
    pub lookahead: u32,

    /// Fixed shift applied to the clock before bucketing.
    pub timezone_offset_secs: i64,

    /// Create every missing partition back to the retention floor on the
    /// first tick after start-up.
    pub backfill_on_start: bool,
}

impl Default for TableRotationConfig {
    fn default() -> Self {
        Self {
            schema: String::new(),
            name: String::new(),
            interval: DAY,
            retention: DAY * 365,
            time_unit: 1,
            lookahead: 5,
            timezone_offset_secs: DEFAULT_TIMEZONE_OFFSET_SECS,
            backfill_on_start: false,
        }
    }
}

impl TableRotationConfig {
    /// `schema.name`, as used in logs and on the command line.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schema.trim().is_empty() || self.name.trim().is_empty() {
            return Err(ConfigError::MissingTableIdentifier);
        }

        let table = self.qualified_name();

        if self.interval.as_secs() == 0 {
            return Err(ConfigError::InvalidInterval {
                table,
                duration: self.interval,
            });
        }
        if self.retention.as_secs() == 0 {
            return Err(ConfigError::InvalidRetention {
                table,
                duration: self.retention,
            });
        }
        if self.time_unit == 0 {
            return Err(ConfigError::InvalidTimeUnit(table));
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Configuration {
    /// Connection to the server hosting the partitioned tables
    pub database: DatabaseConfig,
    /// Rotation loop and per-table windows
    #[serde(default)]
    pub rotator: RotatorConfig,
}

impl Configuration {
    /// Layered load: defaults, then `partkeeper.toml`, then `PARTKEEPER__*` env vars.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::figment(Path::new(DEFAULT_CONFIG_FILE))
            .extract()
            .map_err(Box::new)
    }

    /// Same layering as [`Configuration::load`] with an explicit file.
    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        Self::figment(path).extract().map_err(Box::new)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Configuration::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Look a table up by its `schema.name`.
    pub fn table(&self, qualified_name: &str) -> Option<&TableRotationConfig> {
        self.rotator
            .tables
            .iter()
            .find(|t| t.qualified_name() == qualified_name)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.dsn.trim().is_empty() {
            return Err(ConfigError::EmptyDsn);
        }
        if self.rotator.tick_interval.is_zero() {
            return Err(ConfigError::InvalidTickInterval);
        }

        let mut seen = HashSet::new();
        for table in &self.rotator.tables {
            table.validate()?;
            if !seen.insert(table.qualified_name()) {
                return Err(ConfigError::DuplicateTable(table.qualified_name()));
            }
        }

        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Database DSN cannot be empty")]
    EmptyDsn,

    #[error("Tick interval must be positive")]
    InvalidTickInterval,

    #[error("Table entries need both a schema and a name")]
    MissingTableIdentifier,

    #[error("Table {0} is configured more than once")]
    DuplicateTable(String),

    #[error("Invalid partition interval for {table}: {duration:?} must be at least one second")]
    InvalidInterval { table: String, duration: Duration },

    #[error("Invalid retention for {table}: {duration:?} must be at least one second")]
    InvalidRetention { table: String, duration: Duration },

    #[error("Invalid time unit for {0}: must be at least 1")]
    InvalidTimeUnit(String),
}
