//! Outbound Raft RPC client with cached connections.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::Channel;

use crate::error::{ClusterError, ClusterResult};
use crate::proto::raft_service_client::RaftServiceClient;
use crate::proto::RaftRequest;
use crate::raft::{
    AppendEntriesRequest, AppendEntriesResponse, RequestVoteRequest, RequestVoteResponse,
};

/// Client for Raft RPCs to same-region peers.
///
/// Connections are cached per address. Every call carries an independent
/// deadline so a stuck peer cannot hold up replication or an election.
#[derive(Clone)]
pub struct NetworkClient {
    /// Cached connections to other nodes.
    connections: Arc<RwLock<HashMap<String, Channel>>>,
    /// Per-RPC deadline.
    rpc_timeout: Duration,
}

impl NetworkClient {
    pub fn new(rpc_timeout: Duration) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            rpc_timeout,
        }
    }

    /// Get or create a connection to a peer address.
    async fn get_connection(&self, addr: &str) -> ClusterResult<Channel> {
        // Check cache first
        {
            let connections = self.connections.read();
            if let Some(channel) = connections.get(addr) {
                return Ok(channel.clone());
            }
        }

        // Create new connection
        let endpoint = format!("http://{}", addr);
        let channel = Channel::from_shared(endpoint)
            .map_err(|e| ClusterError::Config(e.to_string()))?
            .connect()
            .await?;

        // Cache it
        {
            let mut connections = self.connections.write();
            connections.insert(addr.to_string(), channel.clone());
        }

        Ok(channel)
    }

    /// Send a RequestVote RPC.
    pub async fn request_vote(
        &self,
        addr: &str,
        req: &RequestVoteRequest,
    ) -> ClusterResult<RequestVoteResponse> {
        let fut = async {
            let channel = self.get_connection(addr).await?;
            let mut client = RaftServiceClient::new(channel);
            let data = serde_json::to_vec(req)?;
            let response = client.request_vote(RaftRequest { data }).await?;
            let resp: RequestVoteResponse = serde_json::from_slice(&response.into_inner().data)?;
            Ok(resp)
        };
        tokio::time::timeout(self.rpc_timeout, fut)
            .await
            .map_err(|_| ClusterError::RpcTimeout {
                target: addr.to_string(),
            })?
    }

    /// Send an AppendEntries RPC.
    pub async fn append_entries(
        &self,
        addr: &str,
        req: &AppendEntriesRequest,
    ) -> ClusterResult<AppendEntriesResponse> {
        let fut = async {
            let channel = self.get_connection(addr).await?;
            let mut client = RaftServiceClient::new(channel);
            let data = serde_json::to_vec(req)?;
            let response = client.append_entries(RaftRequest { data }).await?;
            let resp: AppendEntriesResponse = serde_json::from_slice(&response.into_inner().data)?;
            Ok(resp)
        };
        tokio::time::timeout(self.rpc_timeout, fut)
            .await
            .map_err(|_| ClusterError::RpcTimeout {
                target: addr.to_string(),
            })?
    }
}
