//! `foldersync once`: one cycle, then exit.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use foldersync_sync::{CycleOutcome, CycleReport, Synchronizer};

use super::options::OptionArgs;

#[derive(Args, Debug)]
pub struct OnceArgs {
    #[command(flatten)]
    pub options: OptionArgs,
}

impl OnceArgs {
    pub fn run(self) -> Result<()> {
        let options = self.options.validated_single_cycle()?;
        foldersync_daemon::logging::init(&options.log_file, options.log_level);

        let sync = Synchronizer::from_options(&options);
        let outcome = sync.run_cycle().context("synchronization cycle failed")?;
        let CycleOutcome::Completed(report) = outcome else {
            // Only reachable if another thread shares this synchronizer.
            bail!("synchronization cycle was skipped");
        };

        print_report(&report);
        if !report.copy_failed.is_empty() {
            bail!(
                "{} file(s) could not be copied; they will be retried on the next cycle",
                report.copy_failed.len()
            );
        }
        Ok(())
    }
}

fn print_report(report: &CycleReport) {
    let status = if report.copy_failed.is_empty() && report.delete_failed == 0 {
        "✓".green().bold()
    } else {
        "!".yellow().bold()
    };
    println!(
        "{status} mirrored in {} ms: {} copied ({} bytes), {} unchanged, {} deleted, {} directories pruned",
        report.duration.as_millis(),
        report.copied,
        report.bytes_copied,
        report.unchanged,
        report.deleted,
        report.pruned_dirs,
    );
    if report.vanished > 0 {
        println!("  {} source file(s) vanished during the cycle", report.vanished);
    }
    if report.delete_failed > 0 {
        println!("  {} extraneous file(s) could not be deleted", report.delete_failed);
    }
    for key in &report.copy_failed {
        println!("  {}  {key}", "✗".red());
    }
}
