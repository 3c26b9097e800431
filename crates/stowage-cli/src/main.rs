//! # stowage
//!
//! Command-line management tool for implementation stores.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use stowage_config::{logging, Config};
use stowage_store::{DirectoryStore, StoreSet};

mod commands;

/// Manage content-addressed implementation stores.
#[derive(Parser)]
#[command(name = "stowage", version, about, long_about = None)]
struct Cli {
    /// Operate on this single store directory instead of the configured set.
    #[arg(long, global = true, value_name = "DIR")]
    store: Option<PathBuf>,

    /// Log verbosity: error, warn, info, debug or trace.
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a directory against DIGEST and store it.
    Add {
        #[arg(value_name = "DIGEST")]
        digest: String,
        #[arg(value_name = "DIR")]
        directory: PathBuf,
    },
    /// Print the path of a stored implementation.
    Find {
        #[arg(value_name = "DIGEST")]
        digest: String,
    },
    /// List stored implementations.
    List {
        /// List leftover staging directories instead.
        #[arg(long)]
        temp: bool,
    },
    /// Delete stored implementations.
    Remove {
        #[arg(value_name = "DIGEST", required = true)]
        digests: Vec<String>,
    },
    /// Re-hash implementations and compare against their digests.
    Verify {
        /// A digest in the store set, or the path of a digest-named directory.
        #[arg(value_name = "DIGEST|PATH", required = true)]
        targets: Vec<String>,
    },
    /// Verify every implementation in the given stores.
    Audit {
        /// Store directories; defaults to the configured set.
        #[arg(value_name = "DIR")]
        stores: Vec<PathBuf>,
    },
    /// Print the manifest and digest of a directory.
    Manifest {
        #[arg(value_name = "DIR")]
        directory: PathBuf,
        /// Format prefix: sha1, sha1new or sha256.
        #[arg(value_name = "FORMAT")]
        format: Option<String>,
    },
    /// Print the recommended digests of a directory.
    Digest {
        #[arg(value_name = "DIR")]
        directory: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("stowage: bad configuration: {e}");
            process::exit(2);
        }
    };
    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    logging::init_logging(level);

    match run(&cli, &config) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("stowage: {e:#}");
            process::exit(2);
        }
    }
}

fn run(cli: &Cli, config: &Config) -> Result<i32> {
    match &cli.command {
        Commands::Add { digest, directory } => commands::add(&store_set(cli, config)?, digest, directory),
        Commands::Find { digest } => commands::find(&store_set(cli, config)?, digest),
        Commands::List { temp } => commands::list(&store_set(cli, config)?, *temp),
        Commands::Remove { digests } => commands::remove(&store_set(cli, config)?, digests),
        Commands::Verify { targets } => commands::verify(&store_set(cli, config)?, targets),
        Commands::Audit { stores } => commands::audit(&store_set(cli, config)?, stores),
        Commands::Manifest { directory, format } => commands::manifest(directory, format.as_deref()),
        Commands::Digest { directory } => commands::digest(directory),
    }
}

fn store_set(cli: &Cli, config: &Config) -> Result<StoreSet> {
    match &cli.store {
        Some(dir) => Ok(StoreSet::new(vec![Arc::new(DirectoryStore::new(dir)?)])),
        None => Ok(config.default_store_set()?),
    }
}
