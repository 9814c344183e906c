//! The `tally` command line tool.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Plain-text double-entry bookkeeping.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Show debug output for the load pipeline.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a ledger file and report every error found.
    Check {
        /// The ledger file to check.
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Print errors as a JSON array instead of plain lines.
        #[arg(long)]
        json: bool,

        /// Suppress output; only the exit code reports the outcome.
        #[arg(short, long, conflicts_with = "json")]
        quiet: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();

    match run(&cli) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    match &cli.command {
        Command::Check { file, json, quiet } => {
            let result = tally_loader::load(file);
            tracing::debug!(
                entries = result.entries.len(),
                errors = result.errors.len(),
                hash = %result.input_hash,
                "checked {}",
                file.display()
            );

            let mut stdout = io::stdout().lock();
            if *json {
                serde_json::to_writer_pretty(&mut stdout, &result.errors)?;
                writeln!(stdout)?;
            } else if !quiet {
                for error in &result.errors {
                    writeln!(stdout, "{error}")?;
                }
            }

            Ok(if result.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
