//! Replica Maintenance: remove orphans, prune empty directories.
//!
//! Both passes are idempotent and best-effort: a file or directory that
//! cannot be removed is logged and left for the next cycle.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use foldersync_core::{Snapshot, SnapshotKey};
use walkdir::WalkDir;

use crate::error::SyncError;
use crate::snapshot::{FsSnapshotProvider, SnapshotProvider};
use crate::state_store;

/// Outcome of a delete-extraneous pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: Vec<SnapshotKey>,
    pub failed: Vec<SnapshotKey>,
}

pub trait ReplicaMaintenance: Send + Sync {
    /// Delete replica files whose relative path is absent from
    /// `source_snapshot`. Fails only if the replica itself cannot be walked.
    fn delete_extraneous(
        &self,
        replica_root: &Path,
        source_snapshot: &Snapshot,
    ) -> Result<DeleteReport, SyncError>;

    /// Remove empty directories under `replica_root`, deepest first.
    /// Returns how many were removed. Never fails.
    fn prune_empty_dirs(&self, replica_root: &Path) -> usize;
}

/// Filesystem-backed [`ReplicaMaintenance`].
#[derive(Clone)]
pub struct FsReplicaMaintenance {
    snapshots: Arc<dyn SnapshotProvider>,
}

impl FsReplicaMaintenance {
    pub fn new(snapshots: Arc<dyn SnapshotProvider>) -> Self {
        Self { snapshots }
    }
}

impl Default for FsReplicaMaintenance {
    fn default() -> Self {
        Self::new(Arc::new(FsSnapshotProvider))
    }
}

impl ReplicaMaintenance for FsReplicaMaintenance {
    fn delete_extraneous(
        &self,
        replica_root: &Path,
        source_snapshot: &Snapshot,
    ) -> Result<DeleteReport, SyncError> {
        let replica: Vec<SnapshotKey> = self
            .snapshots
            .entries(replica_root)?
            .into_iter()
            .map(|entry| entry.key)
            .collect();
        let mut report = DeleteReport::default();

        for key in extraneous_keys(&replica, source_snapshot) {
            let full_path = key.to_path(replica_root);
            match std::fs::remove_file(&full_path) {
                Ok(()) => {
                    tracing::info!("deleted extraneous file '{}'", full_path.display());
                    report.deleted.push(key.clone());
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    tracing::error!(
                        "error deleting extraneous file '{}': {err}",
                        full_path.display()
                    );
                    report.failed.push(key.clone());
                }
            }
        }
        Ok(report)
    }

    fn prune_empty_dirs(&self, replica_root: &Path) -> usize {
        let mut dirs: Vec<PathBuf> = Vec::new();
        for entry in WalkDir::new(replica_root).follow_links(false).min_depth(1) {
            match entry {
                Ok(entry) if entry.file_type().is_dir() => dirs.push(entry.into_path()),
                Ok(_) => {}
                Err(err) => tracing::warn!("directory pruning encountered an issue: {err}"),
            }
        }
        dirs.sort_by_key(|dir| std::cmp::Reverse(dir.as_os_str().len()));

        let mut removed = 0;
        for dir in dirs {
            let is_empty = match std::fs::read_dir(&dir) {
                Ok(mut entries) => entries.next().is_none(),
                Err(err) => {
                    tracing::warn!("cannot inspect directory '{}': {err}", dir.display());
                    continue;
                }
            };
            if !is_empty {
                continue;
            }
            match std::fs::remove_dir(&dir) {
                Ok(()) => {
                    tracing::debug!("removed empty directory '{}'", dir.display());
                    removed += 1;
                }
                Err(err) => {
                    tracing::warn!("cannot remove empty directory '{}': {err}", dir.display())
                }
            }
        }
        removed
    }
}

/// Replica files to delete, given one key per on-disk name:
///
/// - names with no counterpart in the source, compared case-insensitively;
/// - names whose spelling differs from the source's when the source spelling
///   is also present as a separate file (left behind by a case-only rename).
///
/// State files kept at the replica root are never returned. Sorted for
/// stable logs.
pub fn extraneous_keys<'a>(replica: &'a [SnapshotKey], source: &Snapshot) -> Vec<&'a SnapshotKey> {
    let spellings: HashSet<&str> = replica.iter().map(SnapshotKey::as_str).collect();

    let mut keys: Vec<&SnapshotKey> = replica
        .iter()
        .filter(|key| !(key.is_top_level() && state_store::is_state_artifact(key.as_str())))
        .filter(|key| match source.get_key_value(*key) {
            None => true,
            Some((source_key, _)) => {
                source_key.as_str() != key.as_str() && spellings.contains(source_key.as_str())
            }
        })
        .collect();
    keys.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    keys.dedup_by(|a, b| a.as_str() == b.as_str());
    keys
}
