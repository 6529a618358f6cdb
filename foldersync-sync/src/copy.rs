//! Retrying Copy Service.
//!
//! ## Single attempt
//!
//! 1. Source missing → [`SyncError::SourceMissing`] (never retried).
//! 2. Destination present and overwrite off → [`SyncError::DestinationExists`].
//! 3. Create the destination's parent hierarchy (already-existing is fine).
//! 4. Copy to `<dest>.foldersync.tmp`.
//! 5. Rename over the destination; remove the temp file on failure.
//!
//! Any other failure is treated as transient: wait `retry_delay` and try
//! again, up to `retries` extra attempts, then surface the last error.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{io_err, SyncError};

/// Suffix of the in-flight copy next to its destination.
pub const TMP_SUFFIX: &str = ".foldersync.tmp";

/// Per-call copy policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyOptions {
    pub overwrite: bool,
    pub retries: u32,
    pub retry_delay: Duration,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            overwrite: true,
            retries: 0,
            retry_delay: Duration::ZERO,
        }
    }
}

/// Copies a single file from an absolute source to an absolute destination.
pub trait FileCopier: Send + Sync {
    /// Returns the number of bytes copied.
    fn copy_file(
        &self,
        source: &Path,
        destination: &Path,
        options: CopyOptions,
    ) -> Result<u64, SyncError>;
}

/// [`FileCopier`] with bounded retries on transient I/O failures.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryingCopyService;

impl FileCopier for RetryingCopyService {
    fn copy_file(
        &self,
        source: &Path,
        destination: &Path,
        options: CopyOptions,
    ) -> Result<u64, SyncError> {
        let mut attempt = 0u32;
        loop {
            match copy_once(source, destination, options.overwrite) {
                Ok(bytes) => return Ok(bytes),
                Err(err @ (SyncError::SourceMissing { .. } | SyncError::DestinationExists { .. })) => {
                    return Err(err)
                }
                Err(err) if attempt < options.retries => {
                    attempt += 1;
                    tracing::warn!(
                        "copy {} -> {} failed (attempt {attempt} of {}): {err}; retrying in {:?}",
                        source.display(),
                        destination.display(),
                        options.retries + 1,
                        options.retry_delay,
                    );
                    std::thread::sleep(options.retry_delay);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// `<dest>.foldersync.tmp`
pub fn tmp_path_for(destination: &Path) -> PathBuf {
    let mut name = OsString::from(destination.as_os_str());
    name.push(TMP_SUFFIX);
    PathBuf::from(name)
}

fn copy_once(source: &Path, destination: &Path, overwrite: bool) -> Result<u64, SyncError> {
    match std::fs::metadata(source) {
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(SyncError::SourceMissing {
                path: source.to_path_buf(),
            })
        }
        Err(err) => return Err(io_err(source, err)),
    }

    if !overwrite && destination.exists() {
        return Err(SyncError::DestinationExists {
            path: destination.to_path_buf(),
        });
    }

    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }

    let tmp = tmp_path_for(destination);
    let bytes = match std::fs::copy(source, &tmp) {
        Ok(bytes) => bytes,
        Err(err) => {
            let _ = std::fs::remove_file(&tmp);
            if err.kind() == ErrorKind::NotFound && !source.exists() {
                return Err(SyncError::SourceMissing {
                    path: source.to_path_buf(),
                });
            }
            return Err(io_err(source, err));
        }
    };

    if let Err(err) = std::fs::rename(&tmp, destination) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(destination, err));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::thread;
    use std::time::Instant;

    use tempfile::TempDir;

    fn retrying(retries: u32, delay_ms: u64) -> CopyOptions {
        CopyOptions {
            overwrite: true,
            retries,
            retry_delay: Duration::from_millis(delay_ms),
        }
    }

    #[test]
    fn basic_copy_works() {
        let root = TempDir::new().unwrap();
        let src = root.path().join("a.txt");
        let dst = root.path().join("b.txt");
        fs::write(&src, "DATA").unwrap();

        let bytes = RetryingCopyService
            .copy_file(&src, &dst, CopyOptions::default())
            .unwrap();

        assert_eq!(bytes, 4);
        assert_eq!(fs::read_to_string(&dst).unwrap(), "DATA");
    }

    #[test]
    fn overwrites_when_requested() {
        let root = TempDir::new().unwrap();
        let src = root.path().join("src.txt");
        let dst = root.path().join("dst.txt");
        fs::write(&src, "V1").unwrap();
        fs::write(&dst, "OLD").unwrap();

        RetryingCopyService
            .copy_file(&src, &dst, CopyOptions::default())
            .unwrap();

        assert_eq!(fs::read_to_string(&dst).unwrap(), "V1");
    }

    #[test]
    fn refuses_existing_destination_without_overwrite() {
        let root = TempDir::new().unwrap();
        let src = root.path().join("src.txt");
        let dst = root.path().join("dst.txt");
        fs::write(&src, "V1").unwrap();
        fs::write(&dst, "OLD").unwrap();

        let options = CopyOptions {
            overwrite: false,
            ..retrying(3, 200)
        };
        let started = Instant::now();
        let err = RetryingCopyService.copy_file(&src, &dst, options).unwrap_err();

        assert!(matches!(err, SyncError::DestinationExists { .. }), "got: {err}");
        assert!(started.elapsed() < Duration::from_millis(200));
        assert_eq!(fs::read_to_string(&dst).unwrap(), "OLD");
    }

    #[test]
    fn missing_source_fails_immediately_without_retry() {
        let root = TempDir::new().unwrap();
        let src = root.path().join("missing.txt");
        let dst = root.path().join("out.txt");

        let started = Instant::now();
        let err = RetryingCopyService
            .copy_file(&src, &dst, retrying(3, 200))
            .unwrap_err();

        assert!(err.is_source_missing(), "got: {err}");
        assert!(started.elapsed() < Duration::from_millis(200));
        assert!(!dst.exists());
    }

    #[test]
    fn creates_destination_hierarchy() {
        let root = TempDir::new().unwrap();
        let src = root.path().join("a.txt");
        let dst = root.path().join("x").join("y").join("z").join("a.txt");
        fs::write(&src, "nested").unwrap();

        RetryingCopyService
            .copy_file(&src, &dst, CopyOptions::default())
            .unwrap();

        assert_eq!(fs::read_to_string(&dst).unwrap(), "nested");
    }

    #[test]
    fn temp_file_is_not_left_behind() {
        let root = TempDir::new().unwrap();
        let src = root.path().join("a.txt");
        let dst = root.path().join("b.txt");
        fs::write(&src, "data").unwrap();

        RetryingCopyService
            .copy_file(&src, &dst, CopyOptions::default())
            .unwrap();

        assert!(!tmp_path_for(&dst).exists());
    }

    #[test]
    fn persistent_failure_is_retried_then_surfaced() {
        let root = TempDir::new().unwrap();
        let src = root.path().join("a.txt");
        fs::write(&src, "data").unwrap();
        // A regular file where the destination directory should be.
        let blocker = root.path().join("blocked");
        fs::write(&blocker, "not a dir").unwrap();
        let dst = blocker.join("a.txt");

        let started = Instant::now();
        let err = RetryingCopyService
            .copy_file(&src, &dst, retrying(2, 40))
            .unwrap_err();

        assert!(matches!(err, SyncError::Io { .. }), "got: {err}");
        assert!(
            started.elapsed() >= Duration::from_millis(80),
            "two retries with a 40ms delay should take at least 80ms"
        );
    }

    #[test]
    fn transient_failure_recovers_within_retry_budget() {
        let root = TempDir::new().unwrap();
        let src = root.path().join("a.txt");
        fs::write(&src, "data").unwrap();
        let blocker = root.path().join("late");
        fs::write(&blocker, "not a dir yet").unwrap();
        let dst = blocker.join("a.txt");

        let unblock = {
            let blocker = blocker.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(60));
                fs::remove_file(&blocker).unwrap();
            })
        };

        let result = RetryingCopyService.copy_file(&src, &dst, retrying(20, 25));
        unblock.join().unwrap();

        result.expect("copy should succeed once the blocker is gone");
        assert_eq!(fs::read_to_string(&dst).unwrap(), "data");
    }
}
