//! Snapshot Provider: walk a tree into a [`Snapshot`].
//!
//! Only regular files are recorded. Symbolic links are never followed, so a
//! link (to a file or a directory) is invisible to both the source and the
//! replica walk. A snapshot is all-or-nothing: the first unreadable entry
//! aborts the walk.

use std::path::Path;

use chrono::{DateTime, Utc};
use foldersync_core::{Snapshot, SnapshotKey};
use walkdir::WalkDir;

use crate::error::{io_err, walk_err, SyncError};

/// One regular file as found on disk, before keys are folded together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub key: SnapshotKey,
    pub modified: DateTime<Utc>,
}

/// Produces a snapshot of a directory tree.
pub trait SnapshotProvider: Send + Sync {
    /// Every regular file under `root`, one entry per on-disk name. Names
    /// differing only in case are separate entries here.
    fn entries(&self, root: &Path) -> Result<Vec<SnapshotEntry>, SyncError>;

    /// Case-insensitive view of [`SnapshotProvider::entries`].
    fn snapshot(&self, root: &Path) -> Result<Snapshot, SyncError> {
        Ok(collapse(root, self.entries(root)?))
    }
}

/// Fold entries into a [`Snapshot`]. When two names differ only in case the
/// later entry replaces the earlier one, key and timestamp together.
pub fn collapse(root: &Path, entries: Vec<SnapshotEntry>) -> Snapshot {
    let mut snapshot = Snapshot::with_capacity(entries.len());
    for entry in entries {
        if let Some((previous, _)) = snapshot.remove_entry(&entry.key) {
            tracing::warn!(
                "case-insensitive path collision under {}: '{}' replaces '{}'",
                root.display(),
                entry.key,
                previous
            );
        }
        snapshot.insert(entry.key, entry.modified);
    }
    snapshot
}

/// Filesystem-backed [`SnapshotProvider`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSnapshotProvider;

impl SnapshotProvider for FsSnapshotProvider {
    fn entries(&self, root: &Path) -> Result<Vec<SnapshotEntry>, SyncError> {
        let meta = std::fs::metadata(root).map_err(|e| io_err(root, e))?;
        if !meta.is_dir() {
            return Err(io_err(root, std::io::Error::other("not a directory")));
        }

        let mut entries = Vec::new();
        let walk = WalkDir::new(root)
            .follow_links(false)
            .min_depth(1)
            .sort_by_file_name();
        for entry in walk {
            let entry = entry.map_err(|e| walk_err(root, e))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            let modified = entry
                .metadata()
                .map_err(|e| walk_err(root, e))?
                .modified()
                .map_err(|e| io_err(entry.path(), e))?;

            entries.push(SnapshotEntry {
                key: SnapshotKey::from_relative(relative),
                modified: DateTime::<Utc>::from(modified),
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{Duration, SystemTime};

    use filetime::{set_file_mtime, FileTime};
    use tempfile::TempDir;

    #[test]
    fn empty_folder_returns_empty_snapshot() {
        let root = TempDir::new().unwrap();
        let snapshot = FsSnapshotProvider.snapshot(root.path()).unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn includes_nested_relative_paths_with_forward_slashes() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("a").join("b")).unwrap();
        fs::write(root.path().join("top.txt"), "1").unwrap();
        fs::write(root.path().join("a").join("b").join("deep.txt"), "2").unwrap();

        let snapshot = FsSnapshotProvider.snapshot(root.path()).unwrap();

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains_key(&SnapshotKey::from("top.txt")));
        assert!(snapshot.contains_key(&SnapshotKey::from("a/b/deep.txt")));
    }

    #[test]
    fn empty_directories_are_not_entries() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("empty").join("nested")).unwrap();
        let snapshot = FsSnapshotProvider.snapshot(root.path()).unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn records_modification_time_in_utc() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("pinned.txt");
        fs::write(&file, "x").unwrap();
        let pinned = SystemTime::UNIX_EPOCH + Duration::new(1_650_000_000, 250_000_000);
        set_file_mtime(&file, FileTime::from_system_time(pinned)).unwrap();

        let snapshot = FsSnapshotProvider.snapshot(root.path()).unwrap();

        let recorded = snapshot[&SnapshotKey::from("pinned.txt")];
        assert_eq!(recorded, DateTime::<Utc>::from(pinned));
    }

    #[test]
    fn missing_root_is_an_error() {
        let root = TempDir::new().unwrap();
        let err = FsSnapshotProvider
            .snapshot(&root.path().join("gone"))
            .unwrap_err();
        assert!(matches!(err, SyncError::Io { .. }), "got: {err}");
    }

    #[test]
    fn file_root_is_an_error() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("file.txt");
        fs::write(&file, "x").unwrap();
        assert!(FsSnapshotProvider.snapshot(&file).is_err());
    }

    #[test]
    fn case_collision_keeps_key_and_timestamp_of_the_same_file() {
        let root = TempDir::new().unwrap();
        let upper = root.path().join("A.txt");
        let lower = root.path().join("a.txt");
        fs::write(&upper, "upper").unwrap();
        fs::write(&lower, "lower").unwrap();
        if fs::read_dir(root.path()).unwrap().count() < 2 {
            // Case-insensitive filesystem: only one name can exist.
            return;
        }
        set_file_mtime(&upper, FileTime::from_unix_time(1000, 0)).unwrap();
        set_file_mtime(&lower, FileTime::from_unix_time(2000, 0)).unwrap();

        let entries = FsSnapshotProvider.entries(root.path()).unwrap();
        assert_eq!(entries.len(), 2, "entries keep both spellings");

        let snapshot = FsSnapshotProvider.snapshot(root.path()).unwrap();
        assert_eq!(snapshot.len(), 1);
        let (key, recorded) = snapshot.iter().next().unwrap();
        let on_disk = fs::metadata(key.to_path(root.path()))
            .unwrap()
            .modified()
            .unwrap();
        assert_eq!(*recorded, DateTime::<Utc>::from(on_disk));
        assert_eq!(key.as_str(), "a.txt", "the later name in walk order wins");
    }

    #[test]
    #[cfg(unix)]
    fn symlinks_are_not_followed() {
        let root = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.txt"), "x").unwrap();
        fs::write(root.path().join("real.txt"), "y").unwrap();
        std::os::unix::fs::symlink(outside.path(), root.path().join("linked_dir")).unwrap();
        std::os::unix::fs::symlink(root.path().join("real.txt"), root.path().join("alias.txt"))
            .unwrap();

        let snapshot = FsSnapshotProvider.snapshot(root.path()).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key(&SnapshotKey::from("real.txt")));
    }
}
