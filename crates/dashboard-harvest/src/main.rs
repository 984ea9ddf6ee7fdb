// Copyright 2026 Dashboard Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use dashboard_harvest::cli;
use dashboard_harvest::cli::run_cmd::RunOverrides;
use dashboard_harvest::HarvestConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "harvest",
    about = "Export every table widget on a set of dashboards and file the downloads by widget",
    version,
    after_help = "Run 'harvest <command> --help' for details on each command."
)]
struct Cli {
    /// Log filter when RUST_LOG is unset (e.g. "debug", "dashboard_harvest=trace")
    #[arg(long, global = true, default_value = "dashboard_harvest=info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Visit every target page once and file its exports
    Run {
        /// JSON configuration file
        #[arg(long, short)]
        config: Option<PathBuf>,
        /// Target page address; repeat for several (replaces the file's list)
        #[arg(long = "target", short = 't')]
        targets: Vec<String>,
        /// Root of the <dashboard>/<widget>.<ext> output tree
        #[arg(long)]
        output_root: Option<PathBuf>,
        /// Scratch directory for raw downloads (wiped at start and end)
        #[arg(long)]
        staging_root: Option<PathBuf>,
        /// Pause after navigation before reading the page, in milliseconds
        #[arg(long)]
        settle_ms: Option<u64>,
        /// Maximum wait for downloads per page, in milliseconds
        #[arg(long)]
        deadline_ms: Option<u64>,
        /// Attach to a running browser (DevTools URL) instead of launching one
        #[arg(long)]
        connect: Option<String>,
        /// Record failing pages and continue instead of aborting the run
        #[arg(long)]
        skip_failed_pages: bool,
        /// Write the run report as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,
        /// Print the run report as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Check browser availability and directory permissions
    Doctor {
        /// JSON configuration file
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

fn init_tracing(cli: &Cli) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let result = match cli.command {
        Commands::Run {
            config,
            targets,
            output_root,
            staging_root,
            settle_ms,
            deadline_ms,
            connect,
            skip_failed_pages,
            report,
            json,
        } => {
            let overrides = RunOverrides {
                config,
                targets,
                output_root,
                staging_root,
                settle_ms,
                deadline_ms,
                connect,
                skip_failed_pages,
                report,
            };
            cli::run_cmd::run(overrides, json).await
        }
        Commands::Doctor { config } => match config {
            Some(path) => match HarvestConfig::from_file(&path) {
                Ok(config) => cli::doctor::run(&config).await,
                Err(e) => Err(e.into()),
            },
            None => cli::doctor::run(&HarvestConfig::default()).await,
        },
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "harvest", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        eprintln!("  Error: {e:#}");
        std::process::exit(1);
    }

    result
}
