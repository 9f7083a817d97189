//! gRPC server for handling Raft RPC requests.

use std::sync::Arc;
use tonic::{Request, Response, Status};

use crate::proto::raft_service_server::RaftService;
use crate::proto::{RaftReply, RaftRequest};
use crate::raft::{AppendEntriesRequest, RaftNode, RequestVoteRequest};

/// gRPC server implementation for Raft RPC.
pub struct RaftServer {
    /// Reference to the Raft node.
    raft: Arc<RaftNode>,
}

impl RaftServer {
    /// Create a new Raft server.
    pub fn new(raft: Arc<RaftNode>) -> Self {
        Self { raft }
    }
}

#[tonic::async_trait]
impl RaftService for RaftServer {
    async fn request_vote(
        &self,
        request: Request<RaftRequest>,
    ) -> Result<Response<RaftReply>, Status> {
        let req: RequestVoteRequest = serde_json::from_slice(&request.into_inner().data)
            .map_err(|e| Status::invalid_argument(e.to_string()))?;

        let resp = self.raft.handle_request_vote(req);

        let data = serde_json::to_vec(&resp).map_err(|e| Status::internal(e.to_string()))?;
        Ok(Response::new(RaftReply { data }))
    }

    async fn append_entries(
        &self,
        request: Request<RaftRequest>,
    ) -> Result<Response<RaftReply>, Status> {
        let req: AppendEntriesRequest = serde_json::from_slice(&request.into_inner().data)
            .map_err(|e| Status::invalid_argument(e.to_string()))?;

        let resp = self.raft.handle_append_entries(req);

        let data = serde_json::to_vec(&resp).map_err(|e| Status::internal(e.to_string()))?;
        Ok(Response::new(RaftReply { data }))
    }
}
