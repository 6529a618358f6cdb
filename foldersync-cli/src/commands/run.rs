//! `foldersync run`: scheduled mirroring in the foreground.

use anyhow::{Context, Result};
use clap::Args;

use super::options::OptionArgs;

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub options: OptionArgs,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let options = self.options.validated()?;
        foldersync_daemon::start_blocking(options).context("foldersync exited with error")
    }
}
