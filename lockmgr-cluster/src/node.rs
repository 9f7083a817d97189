//! LockNode - the main entry point for running a lock manager node.

use std::sync::Arc;

use tokio::sync::{oneshot, watch};
use tonic::transport::Server;

use crate::config::ClusterConfig;
use crate::error::{ClusterError, ClusterResult};
use crate::network::{NetworkClient, RaftServer};
use crate::proto::lock_service_server::LockServiceServer;
use crate::proto::raft_service_server::RaftServiceServer;
use crate::proto::region_service_server::RegionServiceServer;
use crate::raft::{RaftNode, RaftTiming};
use crate::region::RegionCoordinator;
use crate::service::{
    AcquireReply, CheckReply, ExtendReply, LockFrontend, LockServiceImpl, RegionServiceImpl,
    ReleaseReply,
};
use crate::state::LockStateMachine;
use crate::types::NodeId;

/// A node in the lock manager cluster.
///
/// Ties together the Raft node, the replicated lock store, the client
/// front-end, and the gRPC server hosting all three services on one
/// listener.
pub struct LockNode {
    config: ClusterConfig,
    raft: Arc<RaftNode>,
    machine: Arc<LockStateMachine>,
    frontend: Arc<LockFrontend>,
    /// Stops the Raft timer and replication loops.
    shutdown_tx: watch::Sender<bool>,
    /// Stops the gRPC server.
    server_shutdown_tx: Option<oneshot::Sender<()>>,
}

impl LockNode {
    /// Start a new node: spawn the Raft loops and serve RPC.
    pub async fn start(config: ClusterConfig) -> ClusterResult<Self> {
        config.validate().map_err(ClusterError::Config)?;

        let machine = Arc::new(LockStateMachine::new());
        let network = NetworkClient::new(config.rpc_timeout());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let timing = RaftTiming {
            election_timeout: config.election_timeout(),
            heartbeat_interval: config.heartbeat_interval(),
            max_entries_per_append: config.raft.max_entries_per_append,
        };
        let raft = RaftNode::new(
            config.node_id,
            config.peers.clone(),
            timing,
            Arc::clone(&machine),
            network,
            shutdown_rx,
        );
        raft.spawn_loops();

        let coordinator = if config.region_peers.is_empty() {
            None
        } else {
            Some(Arc::new(RegionCoordinator::new(
                config.region_id.clone(),
                config.region_peers.clone(),
                config.region_rpc_timeout(),
            )))
        };

        let frontend = Arc::new(LockFrontend::new(
            config.region_id.clone(),
            config.lock.clone(),
            Arc::clone(&raft),
            Arc::clone(&machine),
            coordinator,
        ));

        let addr: std::net::SocketAddr = config
            .listen_addr
            .parse()
            .map_err(|e: std::net::AddrParseError| ClusterError::Config(e.to_string()))?;

        let raft_server = RaftServer::new(Arc::clone(&raft));
        let lock_service = LockServiceImpl::new(Arc::clone(&frontend));
        let region_service = RegionServiceImpl::new(
            Arc::clone(&raft),
            Arc::clone(&machine),
            config.region_rpc_timeout(),
        );

        let (server_shutdown_tx, server_shutdown_rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = Server::builder()
                .add_service(RaftServiceServer::new(raft_server))
                .add_service(LockServiceServer::new(lock_service))
                .add_service(RegionServiceServer::new(region_service))
                .serve_with_shutdown(addr, async {
                    let _ = server_shutdown_rx.await;
                })
                .await;
        });

        tracing::info!(
            node_id = config.node_id,
            region_id = %config.region_id,
            addr = %config.listen_addr,
            "lock node started"
        );

        Ok(Self {
            config,
            raft,
            machine,
            frontend,
            shutdown_tx,
            server_shutdown_tx: Some(server_shutdown_tx),
        })
    }

    /// Acquire a lock through consensus.
    pub async fn acquire_lock(
        &self,
        lock_id: &str,
        client_id: &str,
        timeout_ms: i64,
    ) -> AcquireReply {
        self.frontend.acquire(lock_id, client_id, timeout_ms).await
    }

    /// Release a lock through consensus.
    pub async fn release_lock(
        &self,
        lock_id: &str,
        client_id: &str,
        fencing_token: u64,
    ) -> ReleaseReply {
        self.frontend
            .release(lock_id, client_id, fencing_token)
            .await
    }

    /// Extend a lease through consensus.
    pub async fn extend_lock(
        &self,
        lock_id: &str,
        client_id: &str,
        fencing_token: u64,
        timeout_ms: i64,
    ) -> ExtendReply {
        self.frontend
            .extend(lock_id, client_id, fencing_token, timeout_ms)
            .await
    }

    /// Check a lock against the local store. Leader-only.
    pub fn check_lock(&self, lock_id: &str) -> CheckReply {
        self.frontend.check(lock_id)
    }

    /// Get the current leader's node ID, if known.
    pub fn leader(&self) -> Option<NodeId> {
        self.raft.leader_id()
    }

    /// Check if this node is the leader.
    pub fn is_leader(&self) -> bool {
        self.raft.is_leader()
    }

    /// Get this node's ID.
    pub fn node_id(&self) -> NodeId {
        self.config.node_id
    }

    /// Get this node's region.
    pub fn region_id(&self) -> &str {
        &self.config.region_id
    }

    /// Get this node's Raft term.
    pub fn current_term(&self) -> u64 {
        self.raft.current_term()
    }

    /// Get a reference to the state machine for read-only queries.
    ///
    /// Reads from a follower's replica are eventually consistent; route
    /// through the leader for authoritative state.
    pub fn state_machine(&self) -> &Arc<LockStateMachine> {
        &self.machine
    }

    /// Shut down the Raft loops and the gRPC server.
    pub fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(tx) = self.server_shutdown_tx.take() {
            let _ = tx.send(());
        }
        tracing::info!(node_id = self.config.node_id, "lock node shutdown");
    }
}

impl Drop for LockNode {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(tx) = self.server_shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
