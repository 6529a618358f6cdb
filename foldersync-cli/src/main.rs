//! foldersync: periodic one-way folder mirroring.
//!
//! # Usage
//!
//! ```text
//! foldersync run     -s <source> -r <replica> -i <ms> -l <log> [--log-level info]
//! foldersync once    -s <source> -r <replica> -l <log>
//! foldersync plan    -s <source> -r <replica> [--json]
//! foldersync status  -s <source> -l <log>
//! foldersync trigger -s <source> -l <log>
//! foldersync stop    -s <source> -l <log>
//! ```
//!
//! Every command also accepts `--config <file.yaml>`; flags override it.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    control::{ControlArgs, ControlCommand},
    once::OnceArgs,
    plan::PlanArgs,
    run::RunArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "foldersync",
    version,
    about = "Keep a replica folder an exact copy of a source folder",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Mirror on a fixed interval until stopped.
    Run(RunArgs),

    /// Run a single cycle and exit.
    Once(OnceArgs),

    /// Show what the next cycle would copy and delete, without changing anything.
    Plan(PlanArgs),

    /// Query a running service.
    Status(ControlArgs),

    /// Ask a running service to run a cycle now.
    Trigger(ControlArgs),

    /// Ask a running service to shut down.
    Stop(ControlArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Once(args) => args.run(),
        Commands::Plan(args) => args.run(),
        Commands::Status(args) => args.run(ControlCommand::Status),
        Commands::Trigger(args) => args.run(ControlCommand::Trigger),
        Commands::Stop(args) => args.run(ControlCommand::Stop),
    }
}
