//! RegionService gRPC implementation, served by every node but only
//! answered substantively by the region's leader.
//!
//! The votee side of the cross-region exchange: a YES vote parks the
//! proposal in a pending map; a COMMIT turns it into an advisory lock entry
//! through the local Raft log; an ABORT drops it (and doubles as the
//! cross-region release path, removing a matching advisory entry).

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tonic::{Request, Response, Status};

use lockmgr_core::time::now_ms;

use crate::log::LogCommand;
use crate::proto::region_service_server::RegionService;
use crate::proto::{
    CrossRegionAck, CrossRegionDecision, CrossRegionProposal, CrossRegionVoteReply,
    RegionDecision, RegionVote,
};
use crate::raft::RaftNode;
use crate::service::frontend::{submit, SubmitError};
use crate::state::{ApplyOutcome, LockStateMachine};

/// A proposal this region voted yes on, awaiting the origin's decision.
#[derive(Debug, Clone)]
struct PendingRemote {
    holder_client_id: String,
    origin_region: String,
    fencing_token: u64,
    expires_at: u64,
}

/// gRPC service implementation for inter-region coordination.
pub struct RegionServiceImpl {
    raft: Arc<RaftNode>,
    machine: Arc<LockStateMachine>,
    /// Deadline for the advisory/release proposals a decision triggers.
    proposal_timeout: Duration,
    /// In-flight proposals keyed by lock id, pruned at their own expiry.
    pending: Mutex<HashMap<String, PendingRemote>>,
}

impl RegionServiceImpl {
    pub fn new(
        raft: Arc<RaftNode>,
        machine: Arc<LockStateMachine>,
        proposal_timeout: Duration,
    ) -> Self {
        Self {
            raft,
            machine,
            proposal_timeout,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn prune_pending(&self, now_ms: u64) {
        self.pending
            .lock()
            .retain(|_, pending| pending.expires_at > now_ms);
    }
}

#[tonic::async_trait]
impl RegionService for RegionServiceImpl {
    async fn propose_cross_region(
        &self,
        request: Request<CrossRegionProposal>,
    ) -> Result<Response<CrossRegionVoteReply>, Status> {
        let req = request.into_inner();
        let now = now_ms();
        self.prune_pending(now);

        // A non-leader cannot speak for the region; the proposer counts
        // this as a missing vote.
        if req.lock_id.is_empty() || !self.raft.is_leader() {
            return Ok(Response::new(CrossRegionVoteReply {
                vote: RegionVote::No as i32,
                known_holder: String::new(),
            }));
        }

        let vote = match self.machine.check(&req.lock_id, now) {
            None => RegionVote::Yes,
            // Re-entrant across retries: the same origin+client pair may
            // confirm again.
            Some(holder)
                if holder.region_id == req.origin_region
                    && holder.holder_client_id == req.holder_client_id =>
            {
                RegionVote::Yes
            }
            Some(holder) => {
                tracing::debug!(
                    lock_id = %req.lock_id,
                    origin = %req.origin_region,
                    holder = %holder.holder_client_id,
                    "cross-region proposal conflicts with local holder"
                );
                return Ok(Response::new(CrossRegionVoteReply {
                    vote: RegionVote::Conflict as i32,
                    known_holder: holder.holder_client_id,
                }));
            }
        };

        self.pending.lock().insert(
            req.lock_id.clone(),
            PendingRemote {
                holder_client_id: req.holder_client_id,
                origin_region: req.origin_region,
                fencing_token: req.fencing_token,
                expires_at: req.expires_at,
            },
        );

        Ok(Response::new(CrossRegionVoteReply {
            vote: vote as i32,
            known_holder: String::new(),
        }))
    }

    async fn confirm_cross_region(
        &self,
        request: Request<CrossRegionDecision>,
    ) -> Result<Response<CrossRegionAck>, Status> {
        let req = request.into_inner();
        let decision = RegionDecision::try_from(req.decision).unwrap_or(RegionDecision::Abort);

        let pending = {
            let mut map = self.pending.lock();
            match map.get(&req.lock_id) {
                Some(p) if p.fencing_token == req.fencing_token => map.remove(&req.lock_id),
                _ => None,
            }
        };

        let acked = match decision {
            RegionDecision::Commit => {
                let Some(pending) = pending else {
                    tracing::debug!(lock_id = %req.lock_id, "commit for unknown cross-region proposal");
                    return Ok(Response::new(CrossRegionAck { acked: false }));
                };
                let command = LogCommand::Acquire {
                    lock_id: req.lock_id.clone(),
                    client_id: pending.holder_client_id,
                    region_id: pending.origin_region,
                    fencing_token: pending.fencing_token,
                    acquired_at: now_ms(),
                    expires_at: pending.expires_at,
                    advisory: true,
                };
                match submit(&self.raft, command, self.proposal_timeout).await {
                    Ok(ApplyOutcome::Acquire(_)) => true,
                    Ok(other) => {
                        tracing::error!(lock_id = %req.lock_id, outcome = ?other, "unexpected outcome recording advisory entry");
                        false
                    }
                    Err(SubmitError::NotLeader(_)) | Err(SubmitError::Timeout) => {
                        tracing::debug!(lock_id = %req.lock_id, "failed to record advisory entry");
                        false
                    }
                }
            }
            RegionDecision::Abort => {
                // Also the release fan-out path: drop a matching advisory
                // entry if one was already recorded.
                let held = self
                    .machine
                    .check(&req.lock_id, now_ms())
                    .filter(|lock| lock.advisory && lock.fencing_token == req.fencing_token);
                if held.is_some() {
                    let command = LogCommand::Release {
                        lock_id: req.lock_id.clone(),
                        fencing_token: req.fencing_token,
                        released_at: now_ms(),
                    };
                    if submit(&self.raft, command, self.proposal_timeout).await.is_err() {
                        tracing::debug!(lock_id = %req.lock_id, "failed to drop advisory entry");
                    }
                }
                true
            }
        };

        Ok(Response::new(CrossRegionAck { acked }))
    }
}
