//! CLI runner for the songplay star-schema ETL.

mod config;
mod error;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::{LevelFilter, info};
use snafu::ResultExt;
use songplay_etl_core::{RunReport, run_pipeline, source::MissingRequiredPolicy};

use crate::{
    config::{EtlConfigFile, Overrides},
    error::{CliResult, PipelineSnafu},
    logging::setup_logging,
};

#[derive(Debug, Subcommand)]
enum Command {
    /// Read both sources and rewrite the five output tables
    Run {
        /// TOML config file (default: built-in defaults)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override [paths] input_root
        #[arg(long)]
        input_root: Option<String>,

        /// Override [paths] output_root
        #[arg(long)]
        output_root: Option<String>,

        /// Override [pipeline] missing_required (drop, quarantine, null)
        #[arg(long)]
        missing_required: Option<MissingRequiredPolicy>,

        /// Override [pipeline] session_time_zone (UTC or +HH:MM)
        #[arg(long)]
        session_time_zone: Option<String>,

        #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
        aws_access_key_id: Option<String>,

        #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
        aws_secret_access_key: Option<String>,
    },

    /// Configuration helpers
    Config {
        #[command(subcommand)]
        cmd: ConfigCommand,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the default configuration as TOML
    Default,
}

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Console log level
    #[arg(long, default_value = "info", global = true)]
    log_level: LevelFilter,

    /// Append logs to this file as well
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// File log level
    #[arg(long, default_value = "debug", global = true)]
    log_file_level: LevelFilter,

    #[command(subcommand)]
    cmd: Command,
}

fn print_report(report: &RunReport) {
    println!("{:<16} {:>10} {:>10}", "table", "rows", "partitions");
    for table in &report.tables {
        println!(
            "{:<16} {:>10} {:>10}",
            table.name, table.rows, table.partitions
        );
    }
    println!(
        "songplays matched to catalog: {}/{}",
        report.matched_songplays, report.play_events
    );
    if report.quarantined > 0 {
        println!("quarantined activity records: {}", report.quarantined);
    }
}

async fn cmd_run(file: Option<PathBuf>, overrides: Overrides) -> CliResult<()> {
    let mut cfg = match &file {
        Some(path) => EtlConfigFile::from_file(path)?,
        None => EtlConfigFile::default(),
    };
    if let Some(path) = &file {
        info!("Loaded config from {}", path.display());
    }
    cfg.apply(overrides);

    let pipeline = cfg.to_pipeline_config()?;
    let report = run_pipeline(&pipeline).await.context(PipelineSnafu)?;
    print_report(&report);
    Ok(())
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();
    setup_logging(cli.log_level, cli.log_file.as_deref(), cli.log_file_level)?;

    match cli.cmd {
        Command::Run {
            config,
            input_root,
            output_root,
            missing_required,
            session_time_zone,
            aws_access_key_id,
            aws_secret_access_key,
        } => {
            let overrides = Overrides {
                input_root,
                output_root,
                missing_required,
                session_time_zone,
                access_key_id: aws_access_key_id,
                secret_access_key: aws_secret_access_key,
            };
            cmd_run(config, overrides).await
        }
        Command::Config {
            cmd: ConfigCommand::Default,
        } => {
            print!("{}", EtlConfigFile::default().to_toml()?);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}", snafu::Report::from_error(e));
        std::process::exit(1);
    }
}
