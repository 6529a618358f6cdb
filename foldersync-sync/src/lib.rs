//! # foldersync-sync
//!
//! One-way mirroring engine.
//!
//! Build a [`Synchronizer`] for a source/replica pair and call
//! [`Synchronizer::run_cycle`] on whatever schedule the caller chooses, or
//! [`Synchronizer::plan`] to preview a cycle without touching disk.

pub mod copy;
pub mod decision;
pub mod error;
pub mod maintenance;
pub mod snapshot;
pub mod state_store;
pub mod synchronizer;

pub use copy::{CopyOptions, FileCopier, RetryingCopyService};
pub use decision::{CopyReason, PlannedCopy, SyncPlan};
pub use error::SyncError;
pub use maintenance::{DeleteReport, FsReplicaMaintenance, ReplicaMaintenance};
pub use snapshot::{FsSnapshotProvider, SnapshotEntry, SnapshotProvider};
pub use synchronizer::{CycleOutcome, CycleReport, RetryPolicy, Synchronizer};
