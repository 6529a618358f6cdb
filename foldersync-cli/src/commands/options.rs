//! Options shared by every command: an optional YAML file plus flag overrides.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use foldersync_core::{LogLevel, SyncOptions, ValidatedOptions};

/// Interval handed to validation by commands that never schedule a cycle.
const SINGLE_CYCLE_INTERVAL_MS: u64 = 1;

#[derive(Args, Debug, Clone, Default)]
pub struct OptionArgs {
    /// YAML file with `source`, `replica`, `interval_ms`, `log`, ... keys.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Folder to mirror.
    #[arg(long, short = 's')]
    pub source: Option<PathBuf>,

    /// Folder kept identical to the source; created if absent.
    #[arg(long, short = 'r')]
    pub replica: Option<PathBuf>,

    /// Milliseconds between cycles.
    #[arg(long, short = 'i', value_name = "MS")]
    pub interval: Option<u64>,

    /// Log file, or a directory to hold `file.log`.
    #[arg(long, short = 'l')]
    pub log: Option<PathBuf>,

    /// Minimum level written to the console and log file.
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Extra attempts for a failed file copy.
    #[arg(long)]
    pub retries: Option<u32>,

    /// Delay between copy attempts, in milliseconds.
    #[arg(long, value_name = "MS")]
    pub retry_delay_ms: Option<u64>,
}

impl OptionArgs {
    /// Config file (if any) with flags applied on top.
    pub fn merged(&self) -> Result<SyncOptions> {
        let mut options = match &self.config {
            Some(path) => SyncOptions::load_at(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => SyncOptions::default(),
        };

        if let Some(source) = &self.source {
            options.source = source.clone();
        }
        if let Some(replica) = &self.replica {
            options.replica = replica.clone();
        }
        if let Some(interval) = self.interval {
            options.interval_ms = interval;
        }
        if let Some(log) = &self.log {
            options.log = log.clone();
        }
        if let Some(level) = self.log_level {
            options.log_level = level;
        }
        if let Some(retries) = self.retries {
            options.copy_retries = retries;
        }
        if let Some(delay) = self.retry_delay_ms {
            options.retry_delay_ms = delay;
        }
        Ok(options)
    }

    /// Fully validated options for the scheduled service.
    pub fn validated(&self) -> Result<ValidatedOptions> {
        self.merged()?
            .normalize_and_validate()
            .context("invalid configuration")
    }

    /// Validated options for a command that runs at most one cycle; the
    /// interval may be omitted.
    pub fn validated_single_cycle(&self) -> Result<ValidatedOptions> {
        let mut options = self.merged()?;
        if self.interval.is_none() && options.interval_ms == 0 {
            options.interval_ms = SINGLE_CYCLE_INTERVAL_MS;
        }
        options
            .normalize_and_validate()
            .context("invalid configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn flags_override_config_file() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("foldersync.yaml");
        fs::write(
            &config,
            "source: /from/file\nreplica: /replica/file\ninterval_ms: 5000\nlog: /logs\n",
        )
        .unwrap();

        let args = OptionArgs {
            config: Some(config),
            replica: Some(PathBuf::from("/replica/flag")),
            retries: Some(7),
            ..OptionArgs::default()
        };
        let merged = args.merged().unwrap();

        assert_eq!(merged.source, PathBuf::from("/from/file"));
        assert_eq!(merged.replica, PathBuf::from("/replica/flag"));
        assert_eq!(merged.interval_ms, 5000);
        assert_eq!(merged.copy_retries, 7);
    }

    #[test]
    fn single_cycle_commands_do_not_need_an_interval() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        let args = OptionArgs {
            source: Some(dir.path().join("src")),
            replica: Some(dir.path().join("rep")),
            log: Some(dir.path().join("logs")),
            ..OptionArgs::default()
        };

        assert!(args.validated().is_err());
        assert!(args.validated_single_cycle().is_ok());
    }

    #[test]
    fn explicit_zero_interval_is_still_rejected() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        let args = OptionArgs {
            source: Some(dir.path().join("src")),
            replica: Some(dir.path().join("rep")),
            log: Some(dir.path().join("logs")),
            interval: Some(0),
            ..OptionArgs::default()
        };

        assert!(args.validated_single_cycle().is_err());
    }
}
