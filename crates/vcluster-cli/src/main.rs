//! vcluster — place and deploy VM clusters onto virtualized infrastructure.
//!
//! # Usage
//!
//! ```text
//! vcluster plan   --provider provider.toml --cluster cluster.toml
//! vcluster deploy --provider provider.toml --cluster cluster.toml --retries 2 --save
//! vcluster list   --provider provider.toml --cluster cluster.toml
//! vcluster delete --provider provider.toml --cluster cluster.toml
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "vcluster",
    about = "Place and deploy VM clusters onto resource pools, hosts and datastores",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Files every command reads.
#[derive(Args, Debug, Clone)]
pub struct Target {
    /// Provider file (endpoint, datacenter, pools, datastore patterns).
    #[arg(short, long)]
    pub provider: PathBuf,
    /// Cluster file (name, template, VM groups).
    #[arg(short, long)]
    pub cluster: PathBuf,
    /// Fix host/datastore shuffling for a reproducible placement.
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the placement a deploy would start from, as JSON.
    Plan {
        #[command(flatten)]
        target: Target,
    },
    /// Create the cluster or add its missing VMs.
    Deploy {
        #[command(flatten)]
        target: Target,
        /// Deploy retries after the first attempt (overrides the provider file).
        #[arg(long)]
        retries: Option<u32>,
        /// Seconds between progress lines.
        #[arg(long, default_value = "1")]
        progress_interval: u64,
        /// Write the in-memory inventory back to its file afterwards.
        #[arg(long)]
        save: bool,
    },
    /// Destroy every VM of the cluster.
    Delete {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        save: bool,
    },
    /// List the cluster's VMs.
    List {
        #[command(flatten)]
        target: Target,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Plan { target } => commands::plan::plan(&target),
        Commands::Deploy {
            target,
            retries,
            progress_interval,
            save,
        } => commands::run::deploy(&target, retries, progress_interval, save).await,
        Commands::Delete { target, save } => commands::run::delete(&target, save).await,
        Commands::List { target, format } => commands::plan::list(&target, &format),
    }
}
