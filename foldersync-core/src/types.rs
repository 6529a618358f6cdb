//! Snapshot data model.
//!
//! A [`Snapshot`] maps a [`SnapshotKey`] (a root-relative path with `/`
//! separators) to the file's last-modification time in UTC. Keys compare
//! case-insensitively; the original spelling is kept for display and for
//! joining back onto a root.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// SnapshotKey
// ---------------------------------------------------------------------------

/// Relative path of a file inside a synchronized tree.
#[derive(Debug, Clone)]
pub struct SnapshotKey {
    display: String,
    folded: String,
}

impl SnapshotKey {
    /// Build a key from a path relative to its root.
    ///
    /// Separators are normalized to `/`; `.` components are dropped.
    pub fn from_relative(relative: &Path) -> Self {
        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::ParentDir => parts.push("..".to_string()),
                Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            }
        }
        Self::from_normalized(parts.join("/"))
    }

    /// Build a key from an already `/`-separated string (e.g. a persisted record).
    pub fn from_normalized(value: impl Into<String>) -> Self {
        let display = value.into().replace('\\', "/");
        let folded = display.to_lowercase();
        Self { display, folded }
    }

    pub fn as_str(&self) -> &str {
        &self.display
    }

    /// `true` when the key names a file directly under the root.
    pub fn is_top_level(&self) -> bool {
        !self.display.contains('/')
    }

    /// Join this key onto `root`, producing a platform path.
    pub fn to_path(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        for part in self.display.split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path
    }
}

impl PartialEq for SnapshotKey {
    fn eq(&self, other: &Self) -> bool {
        self.folded == other.folded
    }
}

impl Eq for SnapshotKey {}

impl Hash for SnapshotKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.folded.hash(state);
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.display.fmt(f)
    }
}

impl From<&str> for SnapshotKey {
    fn from(s: &str) -> Self {
        Self::from_normalized(s)
    }
}

// ---------------------------------------------------------------------------
// Snapshot + ticks
// ---------------------------------------------------------------------------

/// Point-in-time mapping of relative path → last-modification time (UTC).
pub type Snapshot = HashMap<SnapshotKey, DateTime<Utc>>;

/// Convert a timestamp to its persisted tick count (nanoseconds since the
/// Unix epoch). Timestamps outside the `i64` nanosecond range map to `0`.
pub fn to_ticks(timestamp: DateTime<Utc>) -> i64 {
    timestamp.timestamp_nanos_opt().unwrap_or(0)
}

/// Inverse of [`to_ticks`]. Only positive tick values are accepted.
pub fn from_ticks(ticks: i64) -> Option<DateTime<Utc>> {
    if ticks <= 0 {
        return None;
    }
    Some(DateTime::from_timestamp_nanos(ticks))
}

/// Sorted keys, for deterministic output.
pub fn sorted_keys(snapshot: &Snapshot) -> Vec<&SnapshotKey> {
    let mut keys: Vec<&SnapshotKey> = snapshot.keys().collect();
    keys.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    keys
}

// ---------------------------------------------------------------------------
// LogLevel
// ---------------------------------------------------------------------------

/// Minimum level for the log sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(ConfigError::InvalidLogLevel(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_compare_case_insensitively() {
        let mut snapshot = Snapshot::new();
        snapshot.insert(SnapshotKey::from("Dir/A.txt"), Utc::now());
        assert!(snapshot.contains_key(&SnapshotKey::from("dir/a.TXT")));
    }

    #[test]
    fn key_keeps_original_spelling_for_display() {
        let key = SnapshotKey::from_relative(Path::new("Docs").join("Read Me.md").as_path());
        assert_eq!(key.as_str(), "Docs/Read Me.md");
        assert_eq!(key.to_string(), "Docs/Read Me.md");
    }

    #[test]
    fn backslashes_are_normalized() {
        let key = SnapshotKey::from_normalized("a\\b\\c.txt");
        assert_eq!(key.as_str(), "a/b/c.txt");
        assert!(!key.is_top_level());
    }

    #[test]
    fn to_path_joins_each_segment() {
        let key = SnapshotKey::from("dir/sub/file.txt");
        let path = key.to_path(Path::new("/replica"));
        assert_eq!(
            path,
            Path::new("/replica").join("dir").join("sub").join("file.txt")
        );
    }

    #[test]
    fn ticks_preserve_sub_second_precision() {
        let ts = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        let ticks = to_ticks(ts);
        assert_eq!(from_ticks(ticks), Some(ts));
    }

    #[test]
    fn non_positive_ticks_are_rejected() {
        assert_eq!(from_ticks(0), None);
        assert_eq!(from_ticks(-42), None);
    }

    #[test]
    fn log_level_parses_known_names() {
        assert_eq!("INFO".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!(matches!(
            "loud".parse::<LogLevel>(),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }
}
