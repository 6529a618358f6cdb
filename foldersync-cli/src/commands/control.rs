//! `foldersync status|trigger|stop`: talk to a running service.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use foldersync_daemon::paths::socket_path;
use foldersync_daemon::{request_status, request_stop, request_sync, DaemonError};

use super::options::OptionArgs;

#[derive(Debug, Clone, Copy)]
pub enum ControlCommand {
    Status,
    Trigger,
    Stop,
}

/// Identifies the service by its source folder and log location.
#[derive(Args, Debug)]
pub struct ControlArgs {
    #[command(flatten)]
    pub options: OptionArgs,
}

impl ControlArgs {
    pub fn run(self, command: ControlCommand) -> Result<()> {
        let socket = self.socket()?;

        match command {
            ControlCommand::Status => match request_status(&socket) {
                Ok(status) => print_json(&status)?,
                Err(DaemonError::DaemonNotRunning { .. }) => {
                    print_json(&serde_json::json!({
                        "running": false,
                        "socket": socket.display().to_string(),
                    }))?;
                }
                Err(err) => return Err(err).context("failed to query status"),
            },
            ControlCommand::Trigger => {
                let summary = request_sync(&socket).context("failed to trigger a cycle")?;
                print_json(&summary)?;
            }
            ControlCommand::Stop => match request_stop(&socket) {
                Ok(()) => println!("stop requested"),
                Err(DaemonError::DaemonNotRunning { .. }) => println!("foldersync is not running"),
                Err(err) => return Err(err).context("failed to stop foldersync"),
            },
        }
        Ok(())
    }

    fn socket(&self) -> Result<PathBuf> {
        let options = self.options.merged()?;
        let source = options.resolve_source().context("invalid source")?;
        let log_file = options.resolve_log_file().context("invalid log location")?;
        let log_dir = log_file
            .parent()
            .context("log file has no parent directory")?;
        Ok(socket_path(log_dir, &source))
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to render JSON")?
    );
    Ok(())
}
