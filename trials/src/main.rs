use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use trials::config::{RunOverrides, load_config};
use trials::{cli, exit_codes, logging};

#[derive(Parser)]
#[command(
    name = "trials",
    version,
    about = "Run training experiments repeatedly, one log file per run"
)]
struct Cli {
    /// Harness config file. Missing file means defaults.
    #[arg(long, global = true, default_value = "trials.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file if it is missing.
    Init {
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,
    },
    /// List experiments from the experiments dir and the built-in presets.
    List,
    /// Run an experiment N times, writing `run_<i>.log` for each run.
    Run {
        experiment: String,
        #[arg(long)]
        iterations: Option<u32>,
        #[arg(long)]
        log_dir: Option<PathBuf>,
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Exit with status 2 if any run failed.
        #[arg(long)]
        strict: bool,
    },
    /// Aggregate test metrics across an experiment's run logs.
    Report { experiment: String },
    /// Compare two experiments' aggregated metrics.
    Compare { left: String, right: String },
    /// Remove an experiment's run logs and summary.
    Clean { experiment: String },
}

fn main() {
    logging::init();
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
    if let Command::Init { force } = cli.command {
        cli::init_config(&cli.config, force)?;
        return Ok(exit_codes::OK);
    }
    let cfg = load_config(&cli.config)?;
    match cli.command {
        Command::Init { .. } => unreachable!("handled before config load"),
        Command::List => cli::list_experiments(&cfg)?,
        Command::Run {
            experiment,
            iterations,
            log_dir,
            timeout_secs,
            strict,
        } => {
            let overrides = RunOverrides {
                iterations,
                log_dir,
                timeout_secs,
            };
            return cli::run_experiment(&cfg, &experiment, &overrides, strict);
        }
        Command::Report { experiment } => cli::report_experiment(&cfg, &experiment)?,
        Command::Compare { left, right } => cli::compare_experiments(&cfg, &left, &right)?,
        Command::Clean { experiment } => cli::clean_experiment(&cfg, &experiment)?,
    }
    Ok(exit_codes::OK)
}
