//! Common test utilities for lockmgr-cluster tests.

use std::sync::atomic::{AtomicU16, Ordering};

use lockmgr_cluster::{ClusterConfig, LockNode};

/// Atomic counter for allocating unique ports.
static PORT_COUNTER: AtomicU16 = AtomicU16::new(15000);

/// Get a unique port for testing.
pub fn get_test_port() -> u16 {
    PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// A single-region test cluster.
#[allow(dead_code)]
pub struct TestCluster {
    /// Cluster nodes.
    pub nodes: Vec<LockNode>,
    /// Node addresses, indexed like `nodes`.
    pub addresses: Vec<String>,
}

#[allow(dead_code)]
impl TestCluster {
    /// Create a cluster of `node_count` fully meshed nodes and start them.
    pub async fn new(node_count: usize) -> Self {
        let mut addresses = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            addresses.push(format!("127.0.0.1:{}", get_test_port()));
        }

        let mut nodes = Vec::with_capacity(node_count);
        for i in 0..node_count {
            let node_id = i as u64 + 1;
            let mut builder = ClusterConfig::builder()
                .node_id(node_id)
                .listen_addr(addresses[i].clone());

            for (j, addr) in addresses.iter().enumerate() {
                let peer_id = j as u64 + 1;
                if peer_id != node_id {
                    builder = builder.peer(peer_id, addr.clone());
                }
            }

            let config = builder.build().expect("Invalid config");
            let node = LockNode::start(config).await.expect("Failed to start node");
            nodes.push(node);
        }

        Self { nodes, addresses }
    }

    /// Wait until some node considers itself leader; returns its index.
    pub async fn wait_for_leader(&self, timeout_ms: u64) -> Option<usize> {
        self.wait_for_leader_excluding(usize::MAX, timeout_ms).await
    }

    /// Wait for a leader among nodes other than `excluded`.
    pub async fn wait_for_leader_excluding(
        &self,
        excluded: usize,
        timeout_ms: u64,
    ) -> Option<usize> {
        let start = std::time::Instant::now();
        let timeout = std::time::Duration::from_millis(timeout_ms);

        while start.elapsed() < timeout {
            for (i, node) in self.nodes.iter().enumerate() {
                if i != excluded && node.is_leader() {
                    return Some(i);
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }

        None
    }

    /// Shutdown all nodes.
    pub fn shutdown(&mut self) {
        for node in &mut self.nodes {
            node.shutdown();
        }
    }
}

/// Start a standalone single-node region with the given cross-region peers.
#[allow(dead_code)]
pub async fn start_region_node(
    region_id: &str,
    listen_addr: &str,
    region_peers: &[(&str, &str)],
) -> LockNode {
    let mut builder = ClusterConfig::builder()
        .node_id(1)
        .region_id(region_id)
        .listen_addr(listen_addr)
        .region_rpc_timeout_ms(500);

    for (region, addr) in region_peers {
        builder = builder.region_peer(*region, *addr);
    }

    let config = builder.build().expect("Invalid config");
    LockNode::start(config).await.expect("Failed to start node")
}

/// Wait until a standalone node elects itself leader.
#[allow(dead_code)]
pub async fn wait_until_leader(node: &LockNode, timeout_ms: u64) -> bool {
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_millis(timeout_ms);
    while start.elapsed() < timeout {
        if node.is_leader() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
    false
}
