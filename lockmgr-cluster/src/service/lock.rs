//! LockService gRPC implementation for external clients.

use std::sync::Arc;
use tonic::{Request, Response, Status};

use lockmgr_core::LockStatus;

use crate::proto::lock_service_server::LockService;
use crate::proto::{
    AcquireLockRequest, AcquireLockResponse, CheckLockRequest, CheckLockResponse,
    ExtendLockRequest, ExtendLockResponse, LockStatusCode, ReleaseLockRequest,
    ReleaseLockResponse,
};
use crate::service::frontend::LockFrontend;
use crate::types::NodeId;

/// gRPC service implementation for lock clients.
pub struct LockServiceImpl {
    frontend: Arc<LockFrontend>,
}

impl LockServiceImpl {
    pub fn new(frontend: Arc<LockFrontend>) -> Self {
        Self { frontend }
    }
}

#[tonic::async_trait]
impl LockService for LockServiceImpl {
    async fn acquire_lock(
        &self,
        request: Request<AcquireLockRequest>,
    ) -> Result<Response<AcquireLockResponse>, Status> {
        let req = request.into_inner();
        tracing::debug!(lock_id = %req.lock_id, client_id = %req.client_id, "acquire lock");

        let reply = self
            .frontend
            .acquire(&req.lock_id, &req.client_id, req.timeout_ms)
            .await;

        Ok(Response::new(AcquireLockResponse {
            status: status_code(reply.status),
            fencing_token: reply.fencing_token,
            expires_at: reply.expires_at,
            message: reply.message,
            leader_hint: hint(reply.leader_hint),
        }))
    }

    async fn release_lock(
        &self,
        request: Request<ReleaseLockRequest>,
    ) -> Result<Response<ReleaseLockResponse>, Status> {
        let req = request.into_inner();
        tracing::debug!(lock_id = %req.lock_id, client_id = %req.client_id, "release lock");

        let reply = self
            .frontend
            .release(&req.lock_id, &req.client_id, req.fencing_token)
            .await;

        Ok(Response::new(ReleaseLockResponse {
            status: status_code(reply.status),
            message: reply.message,
            leader_hint: hint(reply.leader_hint),
        }))
    }

    async fn extend_lock(
        &self,
        request: Request<ExtendLockRequest>,
    ) -> Result<Response<ExtendLockResponse>, Status> {
        let req = request.into_inner();
        tracing::debug!(lock_id = %req.lock_id, client_id = %req.client_id, "extend lock");

        let reply = self
            .frontend
            .extend(&req.lock_id, &req.client_id, req.fencing_token, req.timeout_ms)
            .await;

        Ok(Response::new(ExtendLockResponse {
            status: status_code(reply.status),
            expires_at: reply.expires_at,
            message: reply.message,
            leader_hint: hint(reply.leader_hint),
        }))
    }

    async fn check_lock(
        &self,
        request: Request<CheckLockRequest>,
    ) -> Result<Response<CheckLockResponse>, Status> {
        let req = request.into_inner();

        let reply = self.frontend.check(&req.lock_id);

        let mut response = CheckLockResponse {
            status: status_code(reply.status),
            holder_client_id: String::new(),
            region_id: String::new(),
            fencing_token: 0,
            expires_at: 0,
            leader_hint: hint(reply.leader_hint),
        };
        if let Some(holder) = reply.holder {
            response.holder_client_id = holder.holder_client_id;
            response.region_id = holder.region_id;
            response.fencing_token = holder.fencing_token;
            response.expires_at = holder.expires_at;
        }

        Ok(Response::new(response))
    }
}

fn status_code(status: LockStatus) -> i32 {
    let code = match status {
        LockStatus::Ok => LockStatusCode::Ok,
        LockStatus::AlreadyLocked => LockStatusCode::AlreadyLocked,
        LockStatus::NotFound => LockStatusCode::NotFound,
        LockStatus::InvalidToken => LockStatusCode::InvalidToken,
        LockStatus::Expired => LockStatusCode::Expired,
        LockStatus::QuorumFailed => LockStatusCode::QuorumFailed,
        LockStatus::NotLeader => LockStatusCode::NotLeader,
        LockStatus::Timeout => LockStatusCode::Timeout,
        LockStatus::Error => LockStatusCode::Error,
    };
    code as i32
}

fn hint(leader: Option<NodeId>) -> u64 {
    leader.unwrap_or(0)
}
