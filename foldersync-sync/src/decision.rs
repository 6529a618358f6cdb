//! Per-file copy decisions and the dry-run plan built from them.

use std::fmt;

use chrono::{DateTime, Utc};
use foldersync_core::SnapshotKey;
use serde::Serialize;

/// Why a file is (re)copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyReason {
    /// No prior entry for this path.
    New,
    /// Prior timestamp differs from the current one.
    Modified,
    /// Timestamp unchanged, but the replica copy is gone.
    MissingInReplica,
}

impl fmt::Display for CopyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CopyReason::New => "new",
            CopyReason::Modified => "modified",
            CopyReason::MissingInReplica => "missing in replica",
        })
    }
}

/// Transient decision record for one source file in one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDecision<'a> {
    pub key: &'a SnapshotKey,
    pub current: DateTime<Utc>,
    pub previous: Option<DateTime<Utc>>,
    pub replica_exists: bool,
}

impl FileDecision<'_> {
    pub fn reason(&self) -> Option<CopyReason> {
        match self.previous {
            None => Some(CopyReason::New),
            Some(previous) if previous != self.current => Some(CopyReason::Modified),
            Some(_) if !self.replica_exists => Some(CopyReason::MissingInReplica),
            Some(_) => None,
        }
    }
}

/// One planned copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCopy {
    pub key: SnapshotKey,
    pub reason: CopyReason,
}

/// What a cycle would do right now, computed without side effects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub copies: Vec<PlannedCopy>,
    pub deletions: Vec<SnapshotKey>,
    pub unchanged: usize,
}

impl SyncPlan {
    pub fn is_noop(&self) -> bool {
        self.copies.is_empty() && self.deletions.is_empty()
    }
}
