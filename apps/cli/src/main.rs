//! Assist CLI - command-line front end for the task-chain engine
//!
//! Provides an `assist` command that validates task definition files, prints
//! the task graph reachable from an entry, and dry-runs chains against a
//! simulated device.

mod commands;
mod config;
mod device;

use clap::{Parser, Subcommand};
use device::ScreenContent;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Assist CLI - drive task chains from the command line
#[derive(Parser, Debug)]
#[command(name = "assist", author, version, about = "Assist - task-chain automation engine")]
struct Args {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate task definition files
    ///
    /// Loads every file into one store and checks that each referenced task
    /// name resolves.
    Validate {
        /// Task definition files (JSON)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the task graph reachable from an entry
    Graph {
        /// Task definition files (JSON)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Entry task
        #[arg(short, long)]
        entry: String,
    },

    /// Dry-run chains against a simulated device
    ///
    /// Clicks and swipes are logged instead of performed. `JustReturn` tasks
    /// always pass, OCR and hash tasks are checked against `--screen-text`
    /// and `--screen-hash`, and `--assume-found` makes every task hit.
    Run {
        /// Task definition files (JSON)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Entry task; repeat to queue several chains
        #[arg(short, long, required = true)]
        entry: Vec<String>,

        /// Engine configuration file (overrides ASSIST_CONFIG)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Treat every recognition as a hit
        #[arg(long)]
        assume_found: bool,

        /// Text the simulated screen shows to OcrDetect tasks
        #[arg(long, value_name = "TEXT")]
        screen_text: Option<String>,

        /// Hex hash the simulated screen has for Hash tasks
        #[arg(long, value_name = "HEX")]
        screen_hash: Option<String>,

        /// Stop the run after this many seconds
        #[arg(long, default_value = "30")]
        timeout: u64,

        /// Print notifications as JSON lines
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Targets match by prefix, so `assist` covers every workspace crate.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("assist={}", args.log_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Validate { files, json } => commands::validate::execute(&files, json),
        Command::Graph { files, entry } => commands::graph::execute(&files, &entry),
        Command::Run { files, entry, config, assume_found, screen_text, screen_hash, timeout, json } => {
            let options = commands::run::RunOptions {
                entries: entry,
                config,
                assume_found,
                screen: ScreenContent { text: screen_text, hash: screen_hash },
                timeout,
                json,
            };
            commands::run::execute(&files, options)
        }
    }
}
