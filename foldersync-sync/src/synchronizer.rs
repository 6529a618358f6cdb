//! Synchronizer: owns one mirroring cycle.
//!
//! ## Cycle
//!
//! 1. Load the previous snapshot from the state store (first cycle only).
//! 2. Snapshot the source.
//! 3. Copy every file that is new, modified, or missing from the replica.
//! 4. Delete extraneous replica files, then prune empty directories.
//! 5. Persist the recorded snapshot if it differs from the previous one.
//!
//! At most one cycle runs per instance: a call that finds a cycle in
//! progress returns [`CycleOutcome::Skipped`] immediately.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use foldersync_core::{types::sorted_keys, Snapshot, SnapshotKey, ValidatedOptions};

use crate::copy::{CopyOptions, FileCopier, RetryingCopyService};
use crate::decision::{FileDecision, PlannedCopy, SyncPlan};
use crate::error::SyncError;
use crate::maintenance::{self, FsReplicaMaintenance, ReplicaMaintenance};
use crate::snapshot::{FsSnapshotProvider, SnapshotProvider};
use crate::state_store;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Counts for one completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub copied: usize,
    pub bytes_copied: u64,
    pub unchanged: usize,
    /// Source files deleted between snapshot and copy.
    pub vanished: usize,
    /// Files whose copy failed after retries; retried next cycle.
    pub copy_failed: Vec<SnapshotKey>,
    pub deleted: usize,
    pub delete_failed: usize,
    pub pruned_dirs: usize,
    pub state_persisted: bool,
    pub duration: Duration,
}

/// Result of a [`Synchronizer::run_cycle`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Another cycle was already running; nothing was done.
    Skipped,
}

/// Retry budget handed to the copy service for every file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            delay: Duration::from_millis(100),
        }
    }
}

// ---------------------------------------------------------------------------
// Synchronizer
// ---------------------------------------------------------------------------

pub struct Synchronizer {
    source: PathBuf,
    replica: PathBuf,
    state_path: PathBuf,
    retry: RetryPolicy,
    snapshots: Arc<dyn SnapshotProvider>,
    copier: Arc<dyn FileCopier>,
    maintenance: Arc<dyn ReplicaMaintenance>,
    /// `None` until the first cycle loads it from the state store.
    previous: Mutex<Option<Snapshot>>,
    running: AtomicBool,
}

impl Synchronizer {
    /// Synchronizer for `source` → `replica` with filesystem-backed components.
    pub fn new(source: impl Into<PathBuf>, replica: impl Into<PathBuf>) -> Self {
        let source = source.into();
        let replica = replica.into();
        let state_path = state_store::state_path(&replica, &source);
        Self {
            source,
            replica,
            state_path,
            retry: RetryPolicy::default(),
            snapshots: Arc::new(FsSnapshotProvider),
            copier: Arc::new(RetryingCopyService),
            maintenance: Arc::new(FsReplicaMaintenance::default()),
            previous: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    pub fn from_options(options: &ValidatedOptions) -> Self {
        Self::new(&options.source, &options.replica).with_retry_policy(RetryPolicy {
            retries: options.copy_retries,
            delay: options.retry_delay,
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_snapshot_provider(mut self, snapshots: Arc<dyn SnapshotProvider>) -> Self {
        self.snapshots = snapshots;
        self
    }

    pub fn with_copier(mut self, copier: Arc<dyn FileCopier>) -> Self {
        self.copier = copier;
        self
    }

    pub fn with_maintenance(mut self, maintenance: Arc<dyn ReplicaMaintenance>) -> Self {
        self.maintenance = maintenance;
        self
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn replica(&self) -> &Path {
        &self.replica
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// `true` while a cycle holds the single-flight guard.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one cycle, or return [`CycleOutcome::Skipped`] without blocking
    /// if one is already in progress.
    ///
    /// Per-file failures are logged and counted; only a failure to snapshot
    /// the source or walk the replica is returned as an error.
    pub fn run_cycle(&self) -> Result<CycleOutcome, SyncError> {
        let Some(_guard) = CycleGuard::try_acquire(&self.running) else {
            tracing::info!("synchronization already in progress; skipping this trigger");
            return Ok(CycleOutcome::Skipped);
        };

        tracing::info!(
            "starting folder synchronization: '{}' -> '{}'",
            self.source.display(),
            self.replica.display()
        );
        let started = Instant::now();
        let previous = self.take_previous();

        match self.cycle(&previous, started) {
            Ok((report, recorded)) => {
                self.store_previous(recorded);
                tracing::info!(
                    "folder synchronization completed in {:?}: {} copied, {} unchanged, {} vanished, {} failed, {} deleted, {} directories pruned",
                    report.duration,
                    report.copied,
                    report.unchanged,
                    report.vanished,
                    report.copy_failed.len(),
                    report.deleted,
                    report.pruned_dirs,
                );
                Ok(CycleOutcome::Completed(report))
            }
            Err(err) => {
                self.store_previous(previous);
                tracing::error!("error during folder synchronization: {err}");
                Err(err)
            }
        }
    }

    /// Compute what a cycle would do now. Touches nothing on disk; a missing
    /// replica root is treated as empty.
    pub fn plan(&self) -> Result<SyncPlan, SyncError> {
        let previous = {
            let slot = self.previous.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(previous) => previous.clone(),
                None => state_store::load(&self.state_path),
            }
        };
        let current = self.snapshots.snapshot(&self.source)?;

        let mut plan = SyncPlan::default();
        for key in sorted_keys(&current) {
            match self.decide(key, &current, &previous).reason() {
                Some(reason) => plan.copies.push(PlannedCopy {
                    key: key.clone(),
                    reason,
                }),
                None => plan.unchanged += 1,
            }
        }

        // A replica that does not exist yet has nothing to delete.
        let mut replica: Vec<SnapshotKey> = if self.replica.exists() {
            self.snapshots
                .entries(&self.replica)?
                .into_iter()
                .map(|entry| entry.key)
                .collect()
        } else {
            Vec::new()
        };
        let on_disk = replica.len();
        // Deletions run after copies, so planned copies count as present.
        replica.extend(plan.copies.iter().map(|copy| copy.key.clone()));
        plan.deletions = maintenance::extraneous_keys(&replica[..], &current)
            .into_iter()
            .filter(|key| replica[..on_disk].iter().any(|k| k.as_str() == key.as_str()))
            .cloned()
            .collect();
        Ok(plan)
    }

    fn cycle(
        &self,
        previous: &Snapshot,
        started: Instant,
    ) -> Result<(CycleReport, Snapshot), SyncError> {
        let current = self.snapshots.snapshot(&self.source)?;
        let mut report = CycleReport::default();
        let mut not_recorded = Vec::new();

        let options = CopyOptions {
            overwrite: true,
            retries: self.retry.retries,
            retry_delay: self.retry.delay,
        };

        for key in sorted_keys(&current) {
            let decision = self.decide(key, &current, previous);
            let Some(reason) = decision.reason() else {
                report.unchanged += 1;
                continue;
            };

            let from = key.to_path(&self.source);
            let to = key.to_path(&self.replica);
            match self.copier.copy_file(&from, &to, options) {
                Ok(bytes) => {
                    tracing::info!(
                        "copied '{}' to '{}' ({reason})",
                        from.display(),
                        to.display()
                    );
                    report.copied += 1;
                    report.bytes_copied += bytes;
                }
                Err(err) if err.is_source_missing() => {
                    tracing::warn!("source file '{}' vanished before copy; skipped", from.display());
                    report.vanished += 1;
                    not_recorded.push(key.clone());
                }
                Err(err) => {
                    tracing::error!(
                        "error copying '{}' to '{}': {err}",
                        from.display(),
                        to.display()
                    );
                    report.copy_failed.push(key.clone());
                    not_recorded.push(key.clone());
                }
            }
        }

        let deletions = self.maintenance.delete_extraneous(&self.replica, &current)?;
        report.deleted = deletions.deleted.len();
        report.delete_failed = deletions.failed.len();
        report.pruned_dirs = self.maintenance.prune_empty_dirs(&self.replica);

        // A file that was not copied must look new next cycle.
        let mut recorded = current;
        for key in &not_recorded {
            recorded.remove(key);
        }

        if *previous != recorded {
            match state_store::save(&self.state_path, &recorded) {
                Ok(()) => report.state_persisted = true,
                Err(err) => tracing::warn!(
                    "could not persist synchronization state to '{}': {err}",
                    self.state_path.display()
                ),
            }
        }

        report.duration = started.elapsed();
        Ok((report, recorded))
    }

    fn decide<'a>(
        &self,
        key: &'a SnapshotKey,
        current: &Snapshot,
        previous: &Snapshot,
    ) -> FileDecision<'a> {
        FileDecision {
            key,
            current: current[key],
            previous: previous.get(key).copied(),
            replica_exists: key.to_path(&self.replica).is_file(),
        }
    }

    fn take_previous(&self) -> Snapshot {
        let mut slot = self.previous.lock().unwrap_or_else(PoisonError::into_inner);
        slot.take()
            .unwrap_or_else(|| state_store::load(&self.state_path))
    }

    fn store_previous(&self, snapshot: Snapshot) {
        let mut slot = self.previous.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(snapshot);
    }
}

/// Single-flight flag held for the duration of a cycle; released on drop,
/// including on panic.
struct CycleGuard<'a>(&'a AtomicBool);

impl<'a> CycleGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
