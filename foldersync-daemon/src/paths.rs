use std::path::{Path, PathBuf};
use std::time::Duration;

use foldersync_sync::state_store::source_fingerprint;

pub const SOCKET_PREFIX: &str = "foldersync-";
pub const SOCKET_EXTENSION: &str = "sock";

/// How often the log file size is checked.
pub const ROTATION_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Bound on queued cycle requests; timer ticks beyond it are dropped.
pub const CYCLE_QUEUE_DEPTH: usize = 16;

/// Control socket for the daemon mirroring `source`, kept next to its log:
/// `<log-dir>/foldersync-<fingerprint>.sock`.
pub fn socket_path(log_dir: &Path, source: &Path) -> PathBuf {
    log_dir.join(format!(
        "{SOCKET_PREFIX}{}.{SOCKET_EXTENSION}",
        source_fingerprint(source)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_path_is_per_source() {
        let logs = Path::new("/var/log/foldersync");
        let a = socket_path(logs, Path::new("/data/a"));
        let b = socket_path(logs, Path::new("/data/b"));
        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(logs));
        assert_eq!(a.extension().and_then(|e| e.to_str()), Some("sock"));
    }
}
