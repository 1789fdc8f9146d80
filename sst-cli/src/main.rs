// SPDX-License-Identifier: AGPL-3.0-or-later
//! Storage Sync Toolkit CLI
//!
//! Moves files between local directories and S3-compatible object storage.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sst")]
#[command(author, version, about = "Storage Sync Toolkit - filesystem and object storage sync", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List records at a location
    #[command(alias = "list")]
    Ls {
        /// Location (`s3://bucket/prefix/`, a path, or `@name`)
        location: String,

        /// Show every entry, directory markers included
        #[arg(short, long)]
        raw: bool,

        /// Glob on the file name (defaults to the configured pattern)
        #[arg(short, long)]
        pattern: Option<String>,
    },

    /// Copy matching records from one location to another
    Sync {
        /// Source location
        source: String,

        /// Destination location
        dest: String,

        /// Glob on the file name
        #[arg(short, long)]
        pattern: Option<String>,

        /// Transfers in flight at once
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,

        /// Read each file back and compare checksums
        #[arg(long)]
        verify: bool,

        /// Store under the bare file name
        #[arg(long)]
        flatten: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete matching records at a location
    Purge {
        /// Location to purge
        location: String,

        /// Glob on the file name
        #[arg(short, long)]
        pattern: Option<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write one record to stdout
    Cat {
        /// Location holding the record
        location: String,

        /// Relative name of the record
        name: String,
    },

    /// Create a directory, or a directory marker in an object store
    Mkdir {
        /// Location to create
        location: String,
    },

    /// Download the sample images
    Fetch {
        /// Target directory (defaults to `@input`, then src/demo/data/input)
        #[arg(short, long)]
        dir: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // A missing .env file is fine; credentials may come from the environment.
    let _ = dotenvy::dotenv();
    init_logging(cli.verbose);

    let session = match commands::Session::load(cli.config.as_deref(), cli.verbose) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Ls {
            location,
            raw,
            pattern,
        } => session.ls(&location, raw, pattern.as_deref()).await,
        Commands::Sync {
            source,
            dest,
            pattern,
            concurrency,
            verify,
            flatten,
            json,
        } => {
            let overrides = commands::SyncOverrides {
                pattern,
                concurrency,
                verify,
                flatten,
            };
            session.sync(&source, &dest, overrides, json).await
        }
        Commands::Purge {
            location,
            pattern,
            json,
        } => session.purge(&location, pattern.as_deref(), json).await,
        Commands::Cat { location, name } => session.cat(&location, &name).await,
        Commands::Mkdir { location } => session.mkdir(&location).await,
        Commands::Fetch { dir } => session.fetch(dir.as_deref()).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
