//! State store: the last synchronized source snapshot, persisted next to
//! the replica so a restarted process does not treat every file as new.
//!
//! Persists a [`StateFile`] JSON document at
//! `<replica>/.foldersync.<16-hex fingerprint of source>.snapshot.json`.
//! Writes go to `<path>.tmp` and are renamed over the final name.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use foldersync_core::types::{from_ticks, to_ticks};
use foldersync_core::{Snapshot, SnapshotKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{io_err, SyncError};

pub const STATE_FILE_PREFIX: &str = ".foldersync.";
pub const STATE_FILE_SUFFIX: &str = ".snapshot.json";
const TMP_EXTENSION: &str = ".tmp";

/// Hex characters of the source fingerprint.
pub const FINGERPRINT_LEN: usize = 16;

/// On-disk payload: relative path → tick count.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateFile {
    pub files: BTreeMap<String, i64>,
}

/// Truncated SHA-256 of the normalized source root.
///
/// Separators are normalized to `/` and trailing separators trimmed, so the
/// fingerprint is stable across restarts for the same pairing.
pub fn source_fingerprint(source_root: &Path) -> String {
    let normalized = source_root.to_string_lossy().replace('\\', "/");
    let trimmed = normalized.trim_end_matches('/');
    let normalized = if trimmed.is_empty() { "/" } else { trimmed };

    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(FINGERPRINT_LEN);
    digest
}

/// `<replica>/.foldersync.<fingerprint>.snapshot.json`: pure, no I/O.
pub fn state_path(replica_root: &Path, source_root: &Path) -> PathBuf {
    replica_root.join(format!(
        "{STATE_FILE_PREFIX}{}{STATE_FILE_SUFFIX}",
        source_fingerprint(source_root)
    ))
}

/// `true` for a state file, or its in-flight temp file, of any pairing.
pub fn is_state_artifact(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    if !lower.starts_with(STATE_FILE_PREFIX) {
        return false;
    }
    let lower = lower.strip_suffix(TMP_EXTENSION).unwrap_or(&lower);
    lower.ends_with(STATE_FILE_SUFFIX)
}

/// Load the persisted snapshot.
///
/// Returns an empty snapshot if the file is absent or cannot be parsed;
/// entries with non-positive ticks are dropped.
pub fn load(path: &Path) -> Snapshot {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            tracing::debug!("no state file at {}; starting fresh", path.display());
            return Snapshot::new();
        }
        Err(err) => {
            tracing::warn!("cannot read state file {}: {err}; starting fresh", path.display());
            return Snapshot::new();
        }
    };

    let state = match serde_json::from_str::<StateFile>(&contents) {
        Ok(state) => state,
        Err(err) => {
            tracing::warn!("malformed state file {}: {err}; starting fresh", path.display());
            return Snapshot::new();
        }
    };

    let mut snapshot = Snapshot::with_capacity(state.files.len());
    for (relative, ticks) in state.files {
        match from_ticks(ticks) {
            Some(timestamp) => {
                snapshot.insert(SnapshotKey::from_normalized(relative), timestamp);
            }
            None => tracing::debug!("ignoring state entry {relative} with ticks {ticks}"),
        }
    }
    snapshot
}

/// Save `snapshot` atomically.
///
/// Writes to `<path>.tmp` then renames to `<path>`.
pub fn save(path: &Path, snapshot: &Snapshot) -> Result<(), SyncError> {
    let Some(dir) = path.parent() else {
        return Err(io_err(
            path,
            std::io::Error::other("invalid state file path"),
        ));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let state = StateFile {
        files: snapshot
            .iter()
            .map(|(key, timestamp)| (key.as_str().to_string(), to_ticks(*timestamp)))
            .collect(),
    };
    let json = serde_json::to_string(&state)?;

    let tmp = tmp_path(path);
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    if let Err(err) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, err));
    }
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(TMP_EXTENSION);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use tempfile::TempDir;

    fn ts(secs: i64, nanos: u32) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, nanos).unwrap()
    }

    #[test]
    fn fingerprint_is_stable_and_sixteen_hex_chars() {
        let a = source_fingerprint(Path::new("/data/source"));
        let b = source_fingerprint(Path::new("/data/source/"));
        assert_eq!(a, b);
        assert_eq!(a.len(), FINGERPRINT_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, source_fingerprint(Path::new("/data/other")));
    }

    #[test]
    fn state_path_lives_in_replica_root() {
        let path = state_path(Path::new("/replica"), Path::new("/source"));
        assert_eq!(path.parent(), Some(Path::new("/replica")));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(is_state_artifact(&name), "{name}");
    }

    #[test]
    fn recognizes_state_artifacts() {
        assert!(is_state_artifact(".foldersync.0123456789abcdef.snapshot.json"));
        assert!(is_state_artifact(".foldersync.0123456789abcdef.snapshot.json.tmp"));
        assert!(!is_state_artifact("notes.snapshot.json"));
        assert!(!is_state_artifact(".foldersync.tmp"));
    }

    #[test]
    fn empty_snapshot_when_file_missing() {
        let tmp = TempDir::new().unwrap();
        let snapshot = load(&tmp.path().join("absent.json"));
        assert!(snapshot.is_empty());
    }

    #[test]
    fn roundtrip_save_load_keeps_sub_second_precision() {
        let tmp = TempDir::new().unwrap();
        let path = state_path(tmp.path(), Path::new("/src"));
        let mut snapshot = Snapshot::new();
        snapshot.insert(SnapshotKey::from("a.txt"), ts(1_700_000_000, 123_456_789));
        snapshot.insert(SnapshotKey::from("dir/B.txt"), ts(1_700_000_001, 1));

        save(&path, &snapshot).unwrap();
        let loaded = load(&path);

        assert_eq!(loaded, snapshot);
        assert!(loaded.keys().any(|k| k.as_str() == "dir/B.txt"));
    }

    #[test]
    fn tmp_file_cleaned_up_after_save() {
        let tmp = TempDir::new().unwrap();
        let path = state_path(tmp.path(), Path::new("/src"));
        save(&path, &Snapshot::new()).unwrap();
        assert!(path.exists());
        assert!(!tmp_path(&path).exists(), "tmp file should be renamed away");
    }

    #[test]
    fn record_is_a_single_files_object() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        let mut snapshot = Snapshot::new();
        snapshot.insert(SnapshotKey::from("a.txt"), ts(1, 5));
        save(&path, &snapshot).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({ "files": { "a.txt": 1_000_000_005i64 } }));
    }

    #[test]
    fn malformed_file_loads_as_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load(&path).is_empty());
    }

    #[test]
    fn non_positive_ticks_are_filtered_on_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"files":{"good.txt":1700000000000000000,"zero.txt":0,"neg.txt":-5}}"#,
        )
        .unwrap();

        let loaded = load(&path);

        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key(&SnapshotKey::from("good.txt")));
    }

    #[test]
    fn failed_rename_keeps_previous_state() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        let mut first = Snapshot::new();
        first.insert(SnapshotKey::from("keep.txt"), ts(10, 0));
        save(&path, &first).unwrap();

        // A directory squatting on the tmp name makes the write fail.
        std::fs::create_dir_all(tmp_path(&path)).unwrap();
        let mut second = Snapshot::new();
        second.insert(SnapshotKey::from("new.txt"), ts(20, 0));
        assert!(save(&path, &second).is_err());

        assert_eq!(load(&path), first);
    }
}
