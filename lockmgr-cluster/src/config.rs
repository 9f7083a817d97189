//! Cluster configuration.

use lockmgr_core::LockConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Configuration for a lock manager node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// This node's unique ID within the region (1-based).
    pub node_id: u64,

    /// Region name used in the cross-region protocol.
    pub region_id: String,

    /// Address this node listens on for all RPC (e.g., "0.0.0.0:5000").
    pub listen_addr: String,

    /// Address advertised to other nodes (e.g., "192.168.1.10:5000").
    /// If not set, uses listen_addr.
    pub advertise_addr: Option<String>,

    /// Same-region peer nodes: node_id -> address.
    pub peers: HashMap<u64, String>,

    /// Other regional leaders: region_id -> address.
    pub region_peers: HashMap<String, String>,

    /// Raft timing configuration.
    pub raft: RaftConfig,

    /// Deadline for inter-region vote/confirm RPCs in milliseconds.
    pub region_rpc_timeout_ms: u64,

    /// Lock lease timeout bounds.
    pub lock: LockConfig,
}

/// Raft timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaftConfig {
    /// Election timeout range (min, max) in milliseconds.
    /// A random value in this range is chosen for each election.
    /// Should be >> heartbeat_interval to avoid spurious elections.
    pub election_timeout_ms: (u64, u64),

    /// Heartbeat interval in milliseconds.
    /// Leader sends heartbeats at this interval to maintain authority.
    pub heartbeat_interval_ms: u64,

    /// Deadline for a single inter-node RPC in milliseconds, so a stuck
    /// peer does not hold up replication.
    pub rpc_timeout_ms: u64,

    /// Maximum entries per AppendEntries RPC.
    pub max_entries_per_append: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_id: 1,
            region_id: "default".to_string(),
            listen_addr: "127.0.0.1:5000".to_string(),
            advertise_addr: None,
            peers: HashMap::new(),
            region_peers: HashMap::new(),
            raft: RaftConfig::default(),
            region_rpc_timeout_ms: 1_000,
            lock: LockConfig::default(),
        }
    }
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            // Election timeout: 150-300ms (standard Raft recommendation)
            election_timeout_ms: (150, 300),
            // Heartbeat: 50ms (should be << election timeout)
            heartbeat_interval_ms: 50,
            // Inter-node RPC deadline equals the election timeout base
            rpc_timeout_ms: 150,
            // Up to 100 entries per batch
            max_entries_per_append: 100,
        }
    }
}

impl ClusterConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ClusterConfigBuilder {
        ClusterConfigBuilder::default()
    }

    /// Get the advertised address (falls back to listen_addr).
    pub fn advertise_addr(&self) -> &str {
        self.advertise_addr.as_deref().unwrap_or(&self.listen_addr)
    }

    /// Get the election timeout as a Duration range.
    pub fn election_timeout(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.raft.election_timeout_ms.0),
            Duration::from_millis(self.raft.election_timeout_ms.1),
        )
    }

    /// Get the heartbeat interval as a Duration.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.raft.heartbeat_interval_ms)
    }

    /// Get the inter-node RPC deadline as a Duration.
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.raft.rpc_timeout_ms)
    }

    /// Get the inter-region RPC deadline as a Duration.
    pub fn region_rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.region_rpc_timeout_ms)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.node_id == 0 {
            return Err("node_id must be > 0".to_string());
        }

        if self.listen_addr.is_empty() {
            return Err("listen_addr is required".to_string());
        }

        if self.region_id.is_empty() {
            return Err("region_id is required".to_string());
        }

        let (min_election, max_election) = self.raft.election_timeout_ms;
        if min_election == 0 || max_election < min_election {
            return Err(format!(
                "election_timeout_ms range ({}, {}) is invalid",
                min_election, max_election
            ));
        }

        // Heartbeat should be much less than election timeout
        if self.raft.heartbeat_interval_ms >= min_election / 2 {
            return Err(format!(
                "heartbeat_interval_ms ({}) should be << election_timeout_ms ({})",
                self.raft.heartbeat_interval_ms, min_election
            ));
        }

        if self.lock.min_timeout_ms > self.lock.max_timeout_ms
            || self.lock.default_timeout_ms < self.lock.min_timeout_ms
            || self.lock.default_timeout_ms > self.lock.max_timeout_ms
        {
            return Err(format!(
                "lock timeout bounds are inconsistent: default {} outside [{}, {}]",
                self.lock.default_timeout_ms, self.lock.min_timeout_ms, self.lock.max_timeout_ms
            ));
        }

        Ok(())
    }
}

/// Builder for ClusterConfig.
#[derive(Debug, Default)]
pub struct ClusterConfigBuilder {
    config: ClusterConfig,
}

impl ClusterConfigBuilder {
    /// Set the node ID.
    pub fn node_id(mut self, id: u64) -> Self {
        self.config.node_id = id;
        self
    }

    /// Set the region ID.
    pub fn region_id(mut self, region: impl Into<String>) -> Self {
        self.config.region_id = region.into();
        self
    }

    /// Set the listen address.
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the advertise address.
    pub fn advertise_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.advertise_addr = Some(addr.into());
        self
    }

    /// Add a same-region peer node.
    pub fn peer(mut self, node_id: u64, addr: impl Into<String>) -> Self {
        self.config.peers.insert(node_id, addr.into());
        self
    }

    /// Set all same-region peers at once.
    pub fn peers(mut self, peers: impl IntoIterator<Item = (u64, String)>) -> Self {
        self.config.peers = peers.into_iter().collect();
        self
    }

    /// Add a regional leader peer.
    pub fn region_peer(mut self, region_id: impl Into<String>, addr: impl Into<String>) -> Self {
        self.config
            .region_peers
            .insert(region_id.into(), addr.into());
        self
    }

    /// Set election timeout range in milliseconds.
    pub fn election_timeout_ms(mut self, min: u64, max: u64) -> Self {
        self.config.raft.election_timeout_ms = (min, max);
        self
    }

    /// Set heartbeat interval in milliseconds.
    pub fn heartbeat_interval_ms(mut self, ms: u64) -> Self {
        self.config.raft.heartbeat_interval_ms = ms;
        self
    }

    /// Set the inter-region RPC deadline in milliseconds.
    pub fn region_rpc_timeout_ms(mut self, ms: u64) -> Self {
        self.config.region_rpc_timeout_ms = ms;
        self
    }

    /// Set the lock lease timeout bounds.
    pub fn lock_timeouts_ms(mut self, default: u64, min: u64, max: u64) -> Self {
        self.config.lock = LockConfig {
            default_timeout_ms: default,
            min_timeout_ms: min,
            max_timeout_ms: max,
        };
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<ClusterConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}
