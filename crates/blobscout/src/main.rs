//! Blobscout command-line interface
//!
//! - `scan`: one discovery pass over the accounts in a config file
//! - `resolve` / `inspect`: look at a single locator or local file
//! - `catalog`: review the discovered records

use anyhow::Result;
use blobscout_logging::LogConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

#[derive(Parser, Debug)]
#[command(name = "blobscout", version, about = "Discover, profile and catalog data files in object storage")]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Catalog database (defaults to the config file's, then ~/.blobscout/catalog.sqlite3)
    #[arg(long, global = true, env = "BLOBSCOUT_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one discovery pass over every configured account
    Scan {
        /// TOML configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Output the scan report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show how a storage locator is interpreted
    Resolve {
        /// Locator, e.g. abfss://fs@acct.dfs.core.windows.net/dir
        locator: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Sample, extract and classify a local file the way a scan would
    Inspect {
        /// File to inspect
        file: PathBuf,

        /// Treat the file as living in a hierarchical (data lake) namespace
        #[arg(long)]
        data_lake: bool,

        /// Inspect header/key names only, without column values
        #[arg(long)]
        names_only: bool,
    },

    /// Review discovered records
    Catalog {
        #[command(subcommand)]
        action: cli::catalog::CatalogAction,
    },
}

impl Commands {
    fn wants_json(&self) -> bool {
        match self {
            Commands::Scan { json, .. } | Commands::Resolve { json, .. } => *json,
            Commands::Inspect { .. } => true,
            Commands::Catalog { action } => action.wants_json(),
        }
    }
}

fn run_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Scan { config, json } => cli::scan::run(cli::scan::ScanArgs {
            config,
            db: cli.db,
            json,
        }),
        Commands::Resolve { locator, json } => cli::resolve::run(&locator, json),
        Commands::Inspect {
            file,
            data_lake,
            names_only,
        } => cli::inspect::run(cli::inspect::InspectArgs {
            file,
            data_lake,
            names_only,
        }),
        Commands::Catalog { action } => cli::catalog::run(action, cli.db),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_config = LogConfig {
        app_name: "blobscout",
        verbose: cli.verbose,
        quiet: cli.command.wants_json(),
    };
    if let Err(err) = blobscout_logging::init_logging(log_config) {
        eprintln!("Warning: failed to initialize logging: {:#}", err);
    }

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{:?}", err);
            ExitCode::from(1)
        }
    }
}
