mod commands;
mod config;
mod context;
mod edge;
mod event;
mod logging;
mod node;
mod paths;
mod process_monitor;
mod status;
mod supervisor;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::context::AppContext;
use crate::logging::LogLevel;

#[derive(Parser)]
#[command(name = "nodectl", about = "Manage an edge node and its on-chain registration")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file
    #[arg(long, global = true, default_value = paths::CONFIG_FILE_NAME)]
    config: PathBuf,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Echo anything to the screen
    Echo {
        words: Vec<String>,
    },
    /// Deploy a new node contract with the operator's data
    Create(commands::node::CreateArgs),
    /// Apply to the configured pool
    Apply(commands::node::ApplyArgs),
    /// Check the status of a submitted pool application
    Check(commands::node::CheckArgs),
    /// Control the edge daemon [start|stop|status]
    Edge(commands::edge::EdgeArgs),
    /// Run the edge daemon in the foreground until Ctrl+C
    Supervise,
    /// Inspect or edit the settings file
    Env(commands::env::EnvArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        LogLevel::Error
    } else {
        LogLevel::from_verbosity(cli.verbose)
    };
    if let Err(e) = logging::try_init(level) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let ctx = AppContext::load(cli.config)?;

    match cli.command {
        Commands::Echo { words } => {
            println!("{}", commands::echo(&words));
            Ok(())
        }
        Commands::Create(args) => commands::node::run_create(&ctx, args).await,
        Commands::Apply(args) => commands::node::run_apply(&ctx, args).await,
        Commands::Check(args) => commands::node::run_check(&ctx, args).await,
        Commands::Edge(args) => commands::edge::run(&ctx, args).await,
        Commands::Supervise => supervisor::run(ctx).await,
        Commands::Env(args) => commands::env::run(&ctx, args),
    }
}
