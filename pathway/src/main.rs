//! Pathway-rule streamline filter.
//!
//! Verifies pathway configs and filters JSON streamline batches against them.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pathway::exit_codes;
use pathway::filter::{FilterRequest, format_stats, run_filter, run_init, run_verify};

#[derive(Parser)]
#[command(
    name = "pathway",
    version,
    about = "Pathway-rule evaluation for tractography streamlines"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a starter pathway config.
    Init {
        config: PathBuf,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Load and verify a pathway config, printing the compiled summary.
    Verify {
        config: PathBuf,
    },
    /// Filter a JSON streamline batch, writing the kept (cropped) streamlines.
    Filter {
        config: PathBuf,
        input: PathBuf,
        output: PathBuf,
        /// Also write discarded streamlines here.
        #[arg(long)]
        discarded: Option<PathBuf>,
        /// Worker threads (overrides `run.threads`).
        #[arg(long)]
        threads: Option<usize>,
        /// Wall-clock budget in seconds (overrides `run.time_limit_secs`).
        #[arg(long)]
        time_limit_secs: Option<u64>,
        /// Write run counters as JSON here.
        #[arg(long)]
        stats: Option<PathBuf>,
        /// Write the per-streamline decisions (index, action, reason, crop) as JSON here.
        #[arg(long)]
        evaluations: Option<PathBuf>,
    },
}

fn main() {
    pathway::logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { config, force } => {
            run_init(&config, force)?;
            println!("wrote {}", config.display());
            Ok(exit_codes::OK)
        }
        Command::Verify { config } => {
            let compiled = run_verify(&config)?;
            println!("{}", compiled.summary());
            Ok(exit_codes::OK)
        }
        Command::Filter {
            config,
            input,
            output,
            discarded,
            threads,
            time_limit_secs,
            stats,
            evaluations,
        } => {
            let request = FilterRequest {
                config,
                input,
                output,
                discarded,
                threads,
                time_limit_secs,
                stats,
                evaluations,
            };
            let stats = run_filter(&request)?;
            print!("{}", format_stats(&stats));
            if stats.kept == 0 {
                Ok(exit_codes::EMPTY)
            } else {
                Ok(exit_codes::OK)
            }
        }
    }
}
