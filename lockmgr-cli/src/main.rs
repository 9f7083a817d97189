//! lockmgr CLI - run and inspect distributed lock manager nodes.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// lockmgr - distributed lock manager with fencing tokens.
#[derive(Parser)]
#[command(name = "lockmgr")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a lock manager node
    Serve {
        /// Node ID within the region (1-based)
        #[arg(long)]
        node_id: u64,

        /// Region name for the cross-region protocol
        #[arg(long, default_value = "default")]
        region_id: String,

        /// Address to listen on for all RPC
        #[arg(long, default_value = "127.0.0.1:5000")]
        listen_addr: String,

        /// Same-region peer as "node_id=host:port" (repeatable)
        #[arg(long = "peer", value_name = "ID=ADDR")]
        peers: Vec<String>,

        /// Regional leader peer as "region_id=host:port" (repeatable)
        #[arg(long = "region-peer", value_name = "REGION=ADDR")]
        region_peers: Vec<String>,

        /// Election timeout range in milliseconds
        #[arg(long, num_args = 2, value_names = ["MIN", "MAX"], default_values_t = [150, 300])]
        election_timeout_ms: Vec<u64>,

        /// Leader heartbeat interval in milliseconds
        #[arg(long, default_value_t = 50)]
        heartbeat_interval_ms: u64,

        /// Default lock TTL in milliseconds
        #[arg(long, default_value_t = 30_000)]
        default_timeout_ms: u64,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    match cli.command {
        Commands::Serve {
            node_id,
            region_id,
            listen_addr,
            peers,
            region_peers,
            election_timeout_ms,
            heartbeat_interval_ms,
            default_timeout_ms,
        } => {
            commands::serve::run(commands::serve::ServeOptions {
                node_id,
                region_id,
                listen_addr,
                peers,
                region_peers,
                election_timeout_ms: (election_timeout_ms[0], election_timeout_ms[1]),
                heartbeat_interval_ms,
                default_timeout_ms,
            })
            .await
        }
        Commands::Version => {
            println!("lockmgr {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "lockmgr_cli={0},lockmgr_cluster={0},lockmgr_core={0}",
            default_level
        ))
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
