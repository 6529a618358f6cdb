//! foldersync core library: snapshot data model, configuration, errors.
//!
//! Public API surface:
//! - [`types`]: snapshot keys, snapshots, tick conversion, log levels
//! - [`config`]: [`SyncOptions`] and one-time startup validation
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{SyncOptions, ValidatedOptions};
pub use error::ConfigError;
pub use types::{LogLevel, Snapshot, SnapshotKey};
