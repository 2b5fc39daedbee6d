//! Test utilities for logsync.
//!
//! Reusable builders for configurations and log entries, plus fakes for
//! the archive seam.
//!
//! # Feature Flag
//!
//! This module is only available when the `testing` feature is enabled or during tests:
//!
//! ```toml
//! [dev-dependencies]
//! common = { path = "../common", features = ["testing"] }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use common::testing::{EntryBuilder, RecordingArchive, TestConfigBuilder};
//!
//! let config = TestConfigBuilder::new().in_memory().build();
//! let entry = EntryBuilder::new("auth").level("ERROR").build();
//! let archive = RecordingArchive::new();
//! ```

mod config_builder;
mod entries;
mod fakes;

pub use config_builder::TestConfigBuilder;
pub use entries::EntryBuilder;
pub use fakes::{ArchivedObject, RecordingArchive};
