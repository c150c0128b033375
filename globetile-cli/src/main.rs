//! Globetile CLI - Command-line interface
//!
//! Caches regions of a tiled globe imagery layer for offline use.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use globetile::retrieval::DEFAULT_BULK_CONCURRENCY;

use commands::common::RegionArgs;
use commands::fetch::FetchArgs;
use error::CliError;
use runner::CliRunner;

#[derive(Parser)]
#[command(name = "globetile")]
#[command(version = globetile::VERSION)]
#[command(about = "Cache globe imagery tile pyramids for offline use", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download every tile of a region into the cache
    Fetch {
        #[command(flatten)]
        region: RegionArgs,

        /// Number of concurrent downloads
        #[arg(long, default_value_t = DEFAULT_BULK_CONCURRENCY)]
        parallel: usize,

        /// Only check the cache, never use the network
        #[arg(long)]
        offline: bool,
    },

    /// Estimate how much of a region still needs downloading
    Estimate {
        #[command(flatten)]
        region: RegionArgs,
    },

    /// Print a layer file with its derived levels
    ShowConfig {
        /// Layer configuration file (.ini, or a cached layer.json)
        layer: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::ShowConfig { layer } => commands::show_config::run(&layer),
        Commands::Fetch {
            region,
            parallel,
            offline,
        } => {
            let runner = CliRunner::new(cli.verbose)?;
            commands::fetch::run(
                &runner,
                FetchArgs {
                    region,
                    parallel,
                    offline,
                },
            )
        }
        Commands::Estimate { region } => {
            let runner = CliRunner::new(cli.verbose)?;
            commands::estimate::run(&runner, region)
        }
    }
}
