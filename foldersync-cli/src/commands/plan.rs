//! `foldersync plan`: dry run of the next cycle.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use foldersync_sync::{CopyReason, SyncPlan, Synchronizer};

use super::options::OptionArgs;

#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub options: OptionArgs,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl PlanArgs {
    pub fn run(self) -> Result<()> {
        let options = self.options.merged()?;
        let source = options.resolve_source().context("invalid source")?;
        let replica = options.resolve_replica().context("invalid replica")?;

        let plan = Synchronizer::new(&source, &replica)
            .plan()
            .context("failed to compute plan")?;

        if self.json {
            let source = source.display().to_string();
            let replica = replica.display().to_string();
            let payload = PlanJson::new(&source, &replica, &plan);
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize plan JSON")?
            );
        } else {
            print_table(&plan);
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct PlanJson<'a> {
    source: &'a str,
    replica: &'a str,
    copies: Vec<PlannedCopyJson>,
    deletions: Vec<String>,
    unchanged: usize,
}

#[derive(Serialize)]
struct PlannedCopyJson {
    path: String,
    reason: CopyReason,
}

impl<'a> PlanJson<'a> {
    fn new(source: &'a str, replica: &'a str, plan: &SyncPlan) -> Self {
        Self {
            source,
            replica,
            copies: plan
                .copies
                .iter()
                .map(|copy| PlannedCopyJson {
                    path: copy.key.to_string(),
                    reason: copy.reason,
                })
                .collect(),
            deletions: plan.deletions.iter().map(|key| key.to_string()).collect(),
            unchanged: plan.unchanged,
        }
    }
}

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "action")]
    action: String,
    #[tabled(rename = "path")]
    path: String,
    #[tabled(rename = "reason")]
    reason: String,
}

fn print_table(plan: &SyncPlan) {
    println!(
        "{} to copy | {} to delete | {} unchanged",
        plan.copies.len(),
        plan.deletions.len(),
        plan.unchanged,
    );
    if plan.is_noop() {
        println!("{} replica is up to date", "✓".green().bold());
        return;
    }

    let rows: Vec<PlanRow> = plan
        .copies
        .iter()
        .map(|copy| PlanRow {
            action: "copy".to_string(),
            path: copy.key.to_string(),
            reason: copy.reason.to_string(),
        })
        .chain(plan.deletions.iter().map(|key| PlanRow {
            action: "delete".to_string(),
            path: key.to_string(),
            reason: "not in source".to_string(),
        }))
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
