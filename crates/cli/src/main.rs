//! OpsBot operator CLI
//!
//! Reads the agent's persisted notification history and probes a running
//! agent's health endpoints.

mod client;
mod commands;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{health, history};
use opsbot_lib::history::DEFAULT_HISTORY_PATH;

/// OpsBot operator CLI
#[derive(Parser)]
#[command(name = "opsctl")]
#[command(author, version, about = "CLI for the OpsBot remediation agent", long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List recorded incident notifications
    History {
        /// History file written by the agent
        #[arg(long, env = "OPSBOT_HISTORY_PATH", default_value = DEFAULT_HISTORY_PATH)]
        path: PathBuf,

        /// Show only the newest N entries
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// Show agent liveness and readiness
    Health {
        /// Agent API base URL
        #[arg(long, env = "OPSBOT_AGENT_URL", default_value = "http://localhost:8080")]
        agent_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::History { path, limit } => {
            history::show_history(&path, limit, cli.format).await?;
        }
        Commands::Health { agent_url } => {
            let client = client::AgentClient::new(&agent_url)?;
            health::show_health(&client, cli.format).await?;
        }
    }

    Ok(())
}
