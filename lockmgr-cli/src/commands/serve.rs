//! Serve command - run a lock manager node until Ctrl+C.

use anyhow::{anyhow, Context, Result};
use lockmgr_cluster::{ClusterConfig, LockNode};

/// Options collected from the command line.
pub struct ServeOptions {
    pub node_id: u64,
    pub region_id: String,
    pub listen_addr: String,
    pub peers: Vec<String>,
    pub region_peers: Vec<String>,
    pub election_timeout_ms: (u64, u64),
    pub heartbeat_interval_ms: u64,
    pub default_timeout_ms: u64,
}

/// Run the serve command.
pub async fn run(options: ServeOptions) -> Result<()> {
    let mut builder = ClusterConfig::builder()
        .node_id(options.node_id)
        .region_id(options.region_id.as_str())
        .listen_addr(options.listen_addr.as_str())
        .election_timeout_ms(options.election_timeout_ms.0, options.election_timeout_ms.1)
        .heartbeat_interval_ms(options.heartbeat_interval_ms)
        .lock_timeouts_ms(options.default_timeout_ms, 1_000, 300_000);

    for peer in &options.peers {
        let (id, addr) = split_pair(peer)?;
        let id: u64 = id
            .parse()
            .with_context(|| format!("invalid peer node id in {:?}", peer))?;
        builder = builder.peer(id, addr);
    }

    for region_peer in &options.region_peers {
        let (region, addr) = split_pair(region_peer)?;
        builder = builder.region_peer(region, addr);
    }

    let config = builder.build().map_err(|e| anyhow!(e))?;

    tracing::info!(
        node_id = options.node_id,
        region_id = %options.region_id,
        addr = %options.listen_addr,
        "starting lock manager node"
    );

    let mut node = LockNode::start(config).await?;

    println!("lockmgr node {} serving on {}", options.node_id, options.listen_addr);
    println!("Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;

    tracing::info!("shutdown signal received");
    println!();
    println!("Shutting down...");
    node.shutdown();

    Ok(())
}

fn split_pair(value: &str) -> Result<(&str, &str)> {
    value
        .split_once('=')
        .ok_or_else(|| anyhow!("expected KEY=ADDR, got {:?}", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_peer_pairs() {
        assert_eq!(split_pair("2=10.0.0.2:5000").unwrap(), ("2", "10.0.0.2:5000"));
        assert!(split_pair("nonsense").is_err());
    }
}
