//! Size-based rotation of the configured log file.
//!
//! `file.log` → `file.log.1` → … → `file.log.<max_files>`; the oldest copy is
//! discarded. The live file is recreated empty after each rotation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Rotate once the live file reaches this size (10 MiB).
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Rotated copies kept next to the live file.
pub const MAX_ROTATED_FILES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub max_bytes: u64,
    pub max_files: usize,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: MAX_LOG_BYTES,
            max_files: MAX_ROTATED_FILES,
        }
    }
}

/// Rotate `log_path` if it has reached `policy.max_bytes`.
///
/// Returns `Ok(false)` when the file is under the threshold or absent.
pub fn rotate_if_needed(log_path: &Path, policy: RotationPolicy) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if size < policy.max_bytes {
        return Ok(false);
    }

    if policy.max_files == 0 {
        fs::File::create(log_path)?;
        return Ok(true);
    }

    match fs::remove_file(numbered_path(log_path, policy.max_files)) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    for n in (1..policy.max_files).rev() {
        let from = numbered_path(log_path, n);
        if from.exists() {
            fs::rename(&from, numbered_path(log_path, n + 1))?;
        }
    }
    fs::rename(log_path, numbered_path(log_path, 1))?;
    fs::File::create(log_path)?;
    Ok(true)
}

/// Rotate the service log with the default policy; failures are logged.
pub fn rotate_log(log_path: &Path) {
    match rotate_if_needed(log_path, RotationPolicy::default()) {
        Ok(true) => tracing::info!(path = %log_path.display(), "log file rotated"),
        Ok(false) => {}
        Err(err) => {
            tracing::warn!(path = %log_path.display(), error = %err, "log rotation failed")
        }
    }
}

/// `<log>.<n>`
pub fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}
