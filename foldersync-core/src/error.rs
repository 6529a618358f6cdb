//! Error types for foldersync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading or validating configuration.
///
/// Every variant is fatal at startup: no cycle runs after one of these.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required path setting was missing or blank.
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("sync interval must be > 0 (milliseconds)")]
    NonPositiveInterval,

    #[error("source folder '{path}' does not exist")]
    SourceNotFound { path: PathBuf },

    #[error("source '{path}' is not a directory")]
    SourceNotDirectory { path: PathBuf },

    /// Source and replica are the same tree, or one contains the other.
    #[error("source '{source_root}' and replica '{replica_root}' overlap")]
    OverlappingRoots {
        source_root: PathBuf,
        replica_root: PathBuf,
    },

    /// The log file would be mirrored over (and deleted) by every cycle.
    #[error("log file '{path}' must not be inside the replica folder")]
    LogInsideReplica { path: PathBuf },

    #[error("log file path '{path}' must include a directory")]
    LogPathWithoutDirectory { path: PathBuf },

    #[error("unknown log level '{0}'; expected: error, warn, info, debug, trace")]
    InvalidLogLevel(String),

    /// Underlying I/O failure, with the path that caused it.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load; includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None` while expanding `~`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
