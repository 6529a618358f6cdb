//! Startup configuration.
//!
//! [`SyncOptions`] is what the user supplies (YAML file and/or CLI flags).
//! [`SyncOptions::normalize_and_validate`] runs once before the first cycle
//! and yields [`ValidatedOptions`]: absolute, canonical roots, an existing
//! replica directory and a resolved log file path.
//!
//! ```yaml
//! source: ~/Documents
//! replica: /mnt/backup/documents
//! interval_ms: 60000
//! log: /var/log/foldersync
//! log_level: info
//! copy_retries: 2
//! retry_delay_ms: 100
//! ```

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::types::LogLevel;

/// File name used when the log target is a directory.
pub const DEFAULT_LOG_FILE_NAME: &str = "file.log";

pub const DEFAULT_COPY_RETRIES: u32 = 2;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 100;

// ---------------------------------------------------------------------------
// 1. Raw options
// ---------------------------------------------------------------------------

/// User-supplied configuration, before validation. Every key may be
/// omitted from the file and supplied by command-line flags instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncOptions {
    #[serde(default)]
    pub source: PathBuf,
    #[serde(default)]
    pub replica: PathBuf,
    #[serde(default)]
    pub interval_ms: u64,
    /// Log file, or a directory that will receive `file.log`.
    #[serde(default)]
    pub log: PathBuf,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default = "default_copy_retries")]
    pub copy_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_copy_retries() -> u32 {
    DEFAULT_COPY_RETRIES
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            replica: PathBuf::new(),
            interval_ms: 0,
            log: PathBuf::new(),
            log_level: LogLevel::default(),
            copy_retries: DEFAULT_COPY_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

/// Options after one-time validation and normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedOptions {
    pub source: PathBuf,
    pub replica: PathBuf,
    pub interval: Duration,
    pub log_file: PathBuf,
    pub log_level: LogLevel,
    pub copy_retries: u32,
    pub retry_delay: Duration,
}

impl ValidatedOptions {
    /// Directory holding the log file (and the daemon control socket).
    pub fn log_dir(&self) -> &Path {
        self.log_file.parent().unwrap_or(Path::new("."))
    }
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

impl SyncOptions {
    /// Load options from a YAML file.
    ///
    /// Returns `ConfigError::Parse` (with path + line context) if malformed.
    pub fn load_at(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    // -----------------------------------------------------------------------
    // 3. Validate
    // -----------------------------------------------------------------------

    /// Validate and normalize the options. Creates the replica root and the
    /// log directory when absent.
    pub fn normalize_and_validate(&self) -> Result<ValidatedOptions, ConfigError> {
        let source = expand_home(require_path(&self.source, "source")?)?;
        let replica = expand_home(require_path(&self.replica, "replica")?)?;
        require_path(&self.log, "log")?;
        if self.interval_ms == 0 {
            return Err(ConfigError::NonPositiveInterval);
        }

        match std::fs::metadata(&source) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(ConfigError::SourceNotDirectory { path: source }),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(ConfigError::SourceNotFound { path: source })
            }
            Err(err) => return Err(io_err(&source, err)),
        }
        let source = std::fs::canonicalize(&source).map_err(|e| io_err(&source, e))?;

        let created_replica = !replica.exists();
        if created_replica {
            std::fs::create_dir_all(&replica).map_err(|e| io_err(&replica, e))?;
        }
        let replica = std::fs::canonicalize(&replica).map_err(|e| io_err(&replica, e))?;

        let log_file = match self.check_placement(&source, &replica) {
            Ok(log_file) => log_file,
            Err(err) => {
                if created_replica {
                    let _ = std::fs::remove_dir(&replica);
                }
                return Err(err);
            }
        };
        if let Some(dir) = log_file.parent() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }

        Ok(ValidatedOptions {
            source,
            replica,
            interval: Duration::from_millis(self.interval_ms),
            log_file,
            log_level: self.log_level,
            copy_retries: self.copy_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        })
    }

    /// Resolve the log file path without touching the filesystem.
    ///
    /// Used by control commands that need the daemon's log directory.
    pub fn resolve_log_file(&self) -> Result<PathBuf, ConfigError> {
        require_path(&self.log, "log")?;
        resolve_log_target(&self.log)
    }

    /// Roots must not nest, and the log must live outside the replica where
    /// it would be deleted as an extraneous file. Returns the log file path.
    fn check_placement(&self, source: &Path, replica: &Path) -> Result<PathBuf, ConfigError> {
        if source.starts_with(replica) || replica.starts_with(source) {
            return Err(ConfigError::OverlappingRoots {
                source_root: source.to_path_buf(),
                replica_root: replica.to_path_buf(),
            });
        }

        let log_file = resolve_log_target(&self.log)?;
        if canonical_lenient(&log_file).starts_with(replica) {
            return Err(ConfigError::LogInsideReplica { path: log_file });
        }
        Ok(log_file)
    }

    /// Canonical source root, for commands that only address a running daemon.
    pub fn resolve_source(&self) -> Result<PathBuf, ConfigError> {
        let source = expand_home(require_path(&self.source, "source")?)?;
        match std::fs::canonicalize(&source) {
            Ok(path) => Ok(path),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(ConfigError::SourceNotFound { path: source })
            }
            Err(err) => Err(io_err(&source, err)),
        }
    }

    /// Replica root without creating it: canonical when it exists,
    /// otherwise made absolute.
    pub fn resolve_replica(&self) -> Result<PathBuf, ConfigError> {
        let replica = expand_home(require_path(&self.replica, "replica")?)?;
        match std::fs::canonicalize(&replica) {
            Ok(path) => Ok(path),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                std::path::absolute(&replica).map_err(|e| io_err(&replica, e))
            }
            Err(err) => Err(io_err(&replica, err)),
        }
    }
}

// ---------------------------------------------------------------------------
// 4. Helpers
// ---------------------------------------------------------------------------

fn require_path<'a>(path: &'a Path, field: &'static str) -> Result<&'a Path, ConfigError> {
    if path.as_os_str().to_string_lossy().trim().is_empty() {
        return Err(ConfigError::EmptyField(field));
    }
    Ok(path)
}

/// Expand a leading `~` component to the home directory.
pub fn expand_home(path: &Path) -> Result<PathBuf, ConfigError> {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "~" => {
            let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
            Ok(home.join(components.as_path()))
        }
        _ => Ok(path.to_path_buf()),
    }
}

/// A directory target (existing directory, or a path without extension)
/// resolves to `<dir>/file.log`; anything else is the log file itself.
fn resolve_log_target(raw: &Path) -> Result<PathBuf, ConfigError> {
    let expanded = expand_home(raw)?;
    let log = std::path::absolute(&expanded).map_err(|e| io_err(&expanded, e))?;

    if log.is_dir() || expanded.extension().is_none() {
        return Ok(log.join(DEFAULT_LOG_FILE_NAME));
    }

    let has_dir = expanded
        .parent()
        .map(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(false);
    if !has_dir {
        return Err(ConfigError::LogPathWithoutDirectory { path: expanded });
    }
    Ok(log)
}

/// Canonical form of a path whose tail may not exist yet: the nearest
/// existing ancestor is canonicalized and the rest appended unchanged.
fn canonical_lenient(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut tail = Vec::new();
    loop {
        if let Ok(mut canonical) = std::fs::canonicalize(existing) {
            canonical.extend(tail.iter().rev());
            return canonical;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name);
                existing = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_home_leaves_plain_paths_untouched() {
        let path = Path::new("/srv/data");
        assert_eq!(expand_home(path).unwrap(), PathBuf::from("/srv/data"));
    }

    #[test]
    fn expand_home_replaces_leading_tilde() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        let expanded = expand_home(Path::new("~/backups")).unwrap();
        assert_eq!(expanded, home.join("backups"));
    }

    #[test]
    fn defaults_carry_copy_policy() {
        let opts = SyncOptions::default();
        assert_eq!(opts.copy_retries, DEFAULT_COPY_RETRIES);
        assert_eq!(opts.retry_delay_ms, DEFAULT_RETRY_DELAY_MS);
        assert_eq!(opts.log_level, LogLevel::Info);
    }

    #[test]
    fn yaml_without_optional_fields_uses_defaults() {
        let yaml = "source: /a\nreplica: /b\ninterval_ms: 500\nlog: /logs\n";
        let opts: SyncOptions = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(opts.interval_ms, 500);
        assert_eq!(opts.copy_retries, DEFAULT_COPY_RETRIES);
        assert_eq!(opts.log_level, LogLevel::Info);
    }

    #[test]
    fn bare_log_file_name_is_rejected() {
        let opts = SyncOptions {
            log: PathBuf::from("sync.log"),
            ..SyncOptions::default()
        };
        let err = opts.resolve_log_file().unwrap_err();
        assert!(matches!(err, ConfigError::LogPathWithoutDirectory { .. }), "got: {err}");
    }
}
