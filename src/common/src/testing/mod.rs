//! Test utilities for partkeeper.
//!
//! Builders for configurations used by unit and end-to-end tests.
//!
//! # Feature Flag
//!
//! This module is only available when the `testing` feature is enabled or during tests:
//!
//! ```toml
//! [dev-dependencies]
//! common = { path = "../common", features = ["testing"] }
//! ```

mod config_builder;

pub use config_builder::{TestConfigBuilder, TestTableBuilder};
