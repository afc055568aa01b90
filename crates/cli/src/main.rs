//! Incident orchestrator CLI
//!
//! A command-line tool for scanning cluster logs, following background
//! scan jobs, reporting incidents and managing runtime configuration.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::scan::{parse_key_value, ScanArgs};
use commands::{clusters, incident, scan, settings};
use std::time::Duration;

/// Incident orchestrator CLI
#[derive(Parser)]
#[command(name = "irctl")]
#[command(author, version, about = "CLI for the incident orchestrator", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via IRCTL_API_URL env var)
    #[arg(long, env = "IRCTL_API_URL", default_value = "http://localhost:8000")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan a cluster and wait for the result
    Scan {
        #[command(flatten)]
        args: ScanArgs,

        /// Print the collected log lines
        #[arg(long)]
        show_logs: bool,
    },

    /// Submit a scan as a background job
    Submit {
        #[command(flatten)]
        args: ScanArgs,
    },

    /// Show a background scan job
    Job {
        /// Job ID returned by submit
        id: String,

        /// Poll until the job finishes
        #[arg(long)]
        wait: bool,

        /// Seconds between polls
        #[arg(long, default_value_t = 2)]
        interval: u64,

        /// Give up waiting after this many seconds
        #[arg(long, default_value_t = 600)]
        timeout: u64,

        /// Print the collected log lines
        #[arg(long)]
        show_logs: bool,
    },

    /// Incident tracker commands
    #[command(subcommand)]
    Incident(IncidentCommands),

    /// Runtime configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),

    /// List kubeconfig contexts
    Clusters,

    /// List namespaces of a context
    Namespaces {
        /// Context name
        cluster: String,
    },
}

#[derive(Subcommand)]
pub enum IncidentCommands {
    /// Report an incident; an open ticket with the same summary is reused
    Report {
        /// One-line summary
        #[arg(long)]
        summary: String,

        /// Free-form details
        #[arg(long, default_value = "")]
        details: String,

        /// Source file used to find an owner
        #[arg(long, default_value = "")]
        file: String,

        /// Line in the source file
        #[arg(long, default_value_t = 0)]
        line: u32,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration with secrets masked
    Show,

    /// Update settings
    Set {
        /// Settings as KEY=VALUE
        #[arg(required = true, value_parser = parse_key_value)]
        pairs: Vec<(String, String)>,
    },
}

async fn run(cli: Cli) -> Result<()> {
    let client = client::ApiClient::new(&cli.api_url)?;

    match cli.command {
        Commands::Scan { args, show_logs } => {
            scan::scan(&client, &args, show_logs, cli.format).await?;
        }
        Commands::Submit { args } => {
            scan::submit(&client, &args, cli.format).await?;
        }
        Commands::Job {
            id,
            wait,
            interval,
            timeout,
            show_logs,
        } => {
            scan::job(
                &client,
                &id,
                wait,
                Duration::from_secs(interval.max(1)),
                Duration::from_secs(timeout),
                show_logs,
                cli.format,
            )
            .await?;
        }
        Commands::Incident(IncidentCommands::Report {
            summary,
            details,
            file,
            line,
        }) => {
            let report = client::IncidentReport {
                error_summary: summary,
                error_details: details,
                file_path: file,
                line_number: line,
            };
            incident::report(&client, report, cli.format).await?;
        }
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::Show => settings::show(&client, cli.format).await?,
            ConfigCommands::Set { pairs } => settings::set(&client, &pairs, cli.format).await?,
        },
        Commands::Clusters => clusters::list_clusters(&client, cli.format).await?,
        Commands::Namespaces { cluster } => {
            clusters::list_namespaces(&client, &cluster, cli.format).await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
