//! The lock service front-end.
//!
//! Validates client requests, assigns fencing tokens, proposes commands to
//! Raft, awaits commit, and coordinates the cross-region quorum. Every
//! failure mode maps onto a [`LockStatus`]; there is no error channel to
//! the client.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lockmgr_core::store::{AcquireOutcome, ExtendOutcome, ReleaseOutcome};
use lockmgr_core::time::now_ms;
use lockmgr_core::{Lock, LockConfig, LockStatus};

use crate::log::LogCommand;
use crate::raft::{ProposalResult, RaftNode};
use crate::region::RegionCoordinator;
use crate::state::{ApplyOutcome, LockStateMachine};
use crate::types::NodeId;

/// Upper bound on client-supplied lock and client identifiers.
pub const MAX_ID_LEN: usize = 256;

/// Response to an AcquireLock call.
#[derive(Debug, Clone)]
pub struct AcquireReply {
    pub status: LockStatus,
    pub fencing_token: u64,
    pub expires_at: u64,
    pub message: String,
    pub leader_hint: Option<NodeId>,
}

/// Response to a ReleaseLock call.
#[derive(Debug, Clone)]
pub struct ReleaseReply {
    pub status: LockStatus,
    pub message: String,
    pub leader_hint: Option<NodeId>,
}

/// Response to an ExtendLock call.
#[derive(Debug, Clone)]
pub struct ExtendReply {
    pub status: LockStatus,
    pub expires_at: u64,
    pub message: String,
    pub leader_hint: Option<NodeId>,
}

/// Response to a CheckLock call.
#[derive(Debug, Clone)]
pub struct CheckReply {
    pub status: LockStatus,
    pub holder: Option<Lock>,
    pub leader_hint: Option<NodeId>,
}

/// Why a proposal did not produce an applied outcome.
pub(crate) enum SubmitError {
    /// The node is not (or no longer) the leader.
    NotLeader(Option<NodeId>),
    /// The proposal did not commit within the deadline. It may still commit
    /// later; the caller treats this as failure and never learns the token.
    Timeout,
}

/// Propose a command and await its application, bounded by `deadline`.
pub(crate) async fn submit(
    raft: &Arc<RaftNode>,
    command: LogCommand,
    deadline: Duration,
) -> Result<ApplyOutcome, SubmitError> {
    let rx = raft.propose(command).map_err(SubmitError::NotLeader)?;
    match tokio::time::timeout(deadline, rx).await {
        Err(_) => Err(SubmitError::Timeout),
        Ok(Err(_)) => Err(SubmitError::NotLeader(raft.leader_id())),
        Ok(Ok(ProposalResult::Superseded)) => Err(SubmitError::NotLeader(raft.leader_id())),
        Ok(Ok(ProposalResult::Applied(outcome))) => Ok(outcome),
    }
}

/// Pre-assigns fencing tokens on the leader.
///
/// Tokens must be distinct even for proposals racing toward the same lock,
/// so the allocator keeps a per-lock counter alongside the store's committed
/// floor: `max(floor, counter) + 1`.
#[derive(Debug, Default)]
struct TokenAllocator {
    counters: Mutex<HashMap<String, u64>>,
}

impl TokenAllocator {
    fn next(&self, lock_id: &str, floor: u64) -> u64 {
        let mut counters = self.counters.lock();
        let counter = counters.entry(lock_id.to_string()).or_insert(0);
        let token = floor.max(*counter) + 1;
        *counter = token;
        token
    }
}

/// The client-facing front-end, shared by the gRPC service and the
/// in-process node API.
pub struct LockFrontend {
    region_id: String,
    lock_config: LockConfig,
    raft: Arc<RaftNode>,
    machine: Arc<LockStateMachine>,
    coordinator: Option<Arc<RegionCoordinator>>,
    allocator: TokenAllocator,
}

impl LockFrontend {
    pub fn new(
        region_id: impl Into<String>,
        lock_config: LockConfig,
        raft: Arc<RaftNode>,
        machine: Arc<LockStateMachine>,
        coordinator: Option<Arc<RegionCoordinator>>,
    ) -> Self {
        Self {
            region_id: region_id.into(),
            lock_config,
            raft,
            machine,
            coordinator,
            allocator: TokenAllocator::default(),
        }
    }

    pub fn region_id(&self) -> &str {
        &self.region_id
    }

    /// Acquire a lock, returning the fencing token and lease expiry.
    pub async fn acquire(&self, lock_id: &str, client_id: &str, timeout_ms: i64) -> AcquireReply {
        if let Err(message) = validate_id("lock_id", lock_id).and(validate_id("client_id", client_id))
        {
            return AcquireReply {
                status: LockStatus::Error,
                fencing_token: 0,
                expires_at: 0,
                message,
                leader_hint: None,
            };
        }

        if !self.raft.is_leader() {
            return AcquireReply {
                status: LockStatus::NotLeader,
                fencing_token: 0,
                expires_at: 0,
                message: String::new(),
                leader_hint: self.leader_hint(),
            };
        }

        let ttl = self.lock_config.normalize_timeout(timeout_ms);
        let fencing_token = self
            .allocator
            .next(lock_id, self.machine.token_floor(lock_id));
        let acquired_at = now_ms();
        let expires_at = acquired_at + ttl;

        let command = LogCommand::Acquire {
            lock_id: lock_id.to_string(),
            client_id: client_id.to_string(),
            region_id: self.region_id.clone(),
            fencing_token,
            acquired_at,
            expires_at,
            advisory: false,
        };

        let outcome = match submit(&self.raft, command, Duration::from_millis(ttl)).await {
            Ok(outcome) => outcome,
            Err(e) => return acquire_submit_error(e),
        };

        match outcome {
            ApplyOutcome::Acquire(AcquireOutcome::Acquired(lock)) => {
                self.confirm_across_regions(lock_id, client_id, lock, ttl)
                    .await
            }
            ApplyOutcome::Acquire(AcquireOutcome::Reentrant(lock)) => {
                // The already-confirmed grant is re-issued as-is; the
                // freshly assigned token is burned.
                AcquireReply {
                    status: LockStatus::Ok,
                    fencing_token: lock.fencing_token,
                    expires_at: lock.expires_at,
                    message: String::new(),
                    leader_hint: None,
                }
            }
            ApplyOutcome::Acquire(AcquireOutcome::Held(holder)) => AcquireReply {
                status: LockStatus::AlreadyLocked,
                fencing_token: 0,
                expires_at: 0,
                message: format!("held by {}", holder.holder_client_id),
                leader_hint: None,
            },
            other => internal_acquire_error(lock_id, other),
        }
    }

    /// Release a lock if the fencing token matches.
    pub async fn release(
        &self,
        lock_id: &str,
        client_id: &str,
        fencing_token: u64,
    ) -> ReleaseReply {
        if let Err(message) = validate_id("lock_id", lock_id).and(validate_id("client_id", client_id))
        {
            return ReleaseReply {
                status: LockStatus::Error,
                message,
                leader_hint: None,
            };
        }

        if !self.raft.is_leader() {
            return ReleaseReply {
                status: LockStatus::NotLeader,
                message: String::new(),
                leader_hint: self.leader_hint(),
            };
        }

        let command = LogCommand::Release {
            lock_id: lock_id.to_string(),
            fencing_token,
            released_at: now_ms(),
        };
        let deadline = Duration::from_millis(self.lock_config.default_timeout_ms);

        let outcome = match submit(&self.raft, command, deadline).await {
            Ok(outcome) => outcome,
            Err(SubmitError::NotLeader(leader_hint)) => {
                return ReleaseReply {
                    status: LockStatus::NotLeader,
                    message: String::new(),
                    leader_hint,
                }
            }
            Err(SubmitError::Timeout) => {
                return ReleaseReply {
                    status: LockStatus::Timeout,
                    message: String::new(),
                    leader_hint: None,
                }
            }
        };

        match outcome {
            ApplyOutcome::Release(ReleaseOutcome::Released) => {
                // Other regions drop their advisory entries eventually; a
                // failed fan-out only delays them until lease expiry.
                if let Some(coordinator) = &self.coordinator {
                    coordinator.release_fanout(lock_id, fencing_token);
                }
                ReleaseReply {
                    status: LockStatus::Ok,
                    message: String::new(),
                    leader_hint: None,
                }
            }
            ApplyOutcome::Release(ReleaseOutcome::NotFound) => ReleaseReply {
                status: LockStatus::NotFound,
                message: String::new(),
                leader_hint: None,
            },
            ApplyOutcome::Release(ReleaseOutcome::InvalidToken { held_token }) => ReleaseReply {
                status: LockStatus::InvalidToken,
                message: format!("holder has token {}", held_token),
                leader_hint: None,
            },
            other => {
                tracing::error!(lock_id, outcome = ?other, "unexpected apply outcome for release");
                ReleaseReply {
                    status: LockStatus::Error,
                    message: "internal error".to_string(),
                    leader_hint: None,
                }
            }
        }
    }

    /// Move a lease expiry forward if the fencing token matches.
    pub async fn extend(
        &self,
        lock_id: &str,
        client_id: &str,
        fencing_token: u64,
        timeout_ms: i64,
    ) -> ExtendReply {
        if let Err(message) = validate_id("lock_id", lock_id).and(validate_id("client_id", client_id))
        {
            return ExtendReply {
                status: LockStatus::Error,
                expires_at: 0,
                message,
                leader_hint: None,
            };
        }

        if !self.raft.is_leader() {
            return ExtendReply {
                status: LockStatus::NotLeader,
                expires_at: 0,
                message: String::new(),
                leader_hint: self.leader_hint(),
            };
        }

        let ttl = self.lock_config.normalize_timeout(timeout_ms);
        let extended_at = now_ms();
        let expires_at = extended_at + ttl;
        let command = LogCommand::Extend {
            lock_id: lock_id.to_string(),
            fencing_token,
            expires_at,
            extended_at,
        };

        let outcome = match submit(&self.raft, command, Duration::from_millis(ttl)).await {
            Ok(outcome) => outcome,
            Err(SubmitError::NotLeader(leader_hint)) => {
                return ExtendReply {
                    status: LockStatus::NotLeader,
                    expires_at: 0,
                    message: String::new(),
                    leader_hint,
                }
            }
            Err(SubmitError::Timeout) => {
                return ExtendReply {
                    status: LockStatus::Timeout,
                    expires_at: 0,
                    message: String::new(),
                    leader_hint: None,
                }
            }
        };

        match outcome {
            ApplyOutcome::Extend(ExtendOutcome::Extended(lock)) => ExtendReply {
                status: LockStatus::Ok,
                expires_at: lock.expires_at,
                message: String::new(),
                leader_hint: None,
            },
            ApplyOutcome::Extend(ExtendOutcome::NotFound) => ExtendReply {
                status: LockStatus::NotFound,
                expires_at: 0,
                message: String::new(),
                leader_hint: None,
            },
            ApplyOutcome::Extend(ExtendOutcome::Expired) => ExtendReply {
                status: LockStatus::Expired,
                expires_at: 0,
                message: String::new(),
                leader_hint: None,
            },
            ApplyOutcome::Extend(ExtendOutcome::InvalidToken { held_token }) => ExtendReply {
                status: LockStatus::InvalidToken,
                expires_at: 0,
                message: format!("holder has token {}", held_token),
                leader_hint: None,
            },
            other => {
                tracing::error!(lock_id, outcome = ?other, "unexpected apply outcome for extend");
                ExtendReply {
                    status: LockStatus::Error,
                    expires_at: 0,
                    message: "internal error".to_string(),
                    leader_hint: None,
                }
            }
        }
    }

    /// Read the leader's lock store directly.
    ///
    /// Reads between a remote commit and the local apply may be stale; the
    /// client retries or relies on AcquireLock for authoritative state.
    pub fn check(&self, lock_id: &str) -> CheckReply {
        if validate_id("lock_id", lock_id).is_err() {
            return CheckReply {
                status: LockStatus::Error,
                holder: None,
                leader_hint: None,
            };
        }

        if !self.raft.is_leader() {
            return CheckReply {
                status: LockStatus::NotLeader,
                holder: None,
                leader_hint: self.leader_hint(),
            };
        }

        match self.machine.check(lock_id, now_ms()) {
            Some(lock) => CheckReply {
                status: LockStatus::Ok,
                holder: Some(lock),
                leader_hint: None,
            },
            None => CheckReply {
                status: LockStatus::NotFound,
                holder: None,
                leader_hint: None,
            },
        }
    }

    async fn confirm_across_regions(
        &self,
        lock_id: &str,
        client_id: &str,
        lock: Lock,
        ttl: u64,
    ) -> AcquireReply {
        let Some(coordinator) = &self.coordinator else {
            return AcquireReply {
                status: LockStatus::Ok,
                fencing_token: lock.fencing_token,
                expires_at: lock.expires_at,
                message: String::new(),
                leader_hint: None,
            };
        };

        match coordinator
            .confirm_acquisition(lock_id, client_id, lock.fencing_token, lock.expires_at)
            .await
        {
            Ok(()) => AcquireReply {
                status: LockStatus::Ok,
                fencing_token: lock.fencing_token,
                expires_at: lock.expires_at,
                message: String::new(),
                leader_hint: None,
            },
            Err(e) => {
                tracing::warn!(lock_id, error = %e, "cross-region quorum failed, releasing");
                let release = LogCommand::Release {
                    lock_id: lock_id.to_string(),
                    fencing_token: lock.fencing_token,
                    released_at: now_ms(),
                };
                if let Err(SubmitError::Timeout) =
                    submit(&self.raft, release, Duration::from_millis(ttl)).await
                {
                    tracing::error!(lock_id, "compensating release did not commit in time");
                }
                AcquireReply {
                    status: LockStatus::QuorumFailed,
                    fencing_token: 0,
                    expires_at: 0,
                    message: "cross-region quorum not reached".to_string(),
                    leader_hint: None,
                }
            }
        }
    }

    fn leader_hint(&self) -> Option<NodeId> {
        self.raft.leader_id()
    }
}

fn validate_id(field: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{} must not be empty", field));
    }
    if value.len() > MAX_ID_LEN {
        return Err(format!("{} exceeds {} bytes", field, MAX_ID_LEN));
    }
    Ok(())
}

fn acquire_submit_error(e: SubmitError) -> AcquireReply {
    match e {
        SubmitError::NotLeader(leader_hint) => AcquireReply {
            status: LockStatus::NotLeader,
            fencing_token: 0,
            expires_at: 0,
            message: String::new(),
            leader_hint,
        },
        SubmitError::Timeout => AcquireReply {
            status: LockStatus::Timeout,
            fencing_token: 0,
            expires_at: 0,
            message: String::new(),
            leader_hint: None,
        },
    }
}

fn internal_acquire_error(lock_id: &str, outcome: ApplyOutcome) -> AcquireReply {
    tracing::error!(lock_id, outcome = ?outcome, "unexpected apply outcome for acquire");
    AcquireReply {
        status: LockStatus::Error,
        fencing_token: 0,
        expires_at: 0,
        message: "internal error".to_string(),
        leader_hint: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_rides_above_floor_and_counter() {
        let allocator = TokenAllocator::default();

        assert_eq!(allocator.next("l1", 0), 1);
        assert_eq!(allocator.next("l1", 0), 2);
        // A committed floor from a previous leader jumps the counter.
        assert_eq!(allocator.next("l1", 10), 11);
        assert_eq!(allocator.next("l1", 10), 12);
        // Locks allocate independently.
        assert_eq!(allocator.next("l2", 0), 1);
    }

    #[test]
    fn id_validation() {
        assert!(validate_id("lock_id", "jobs/refresh").is_ok());
        assert!(validate_id("lock_id", "").is_err());
        assert!(validate_id("client_id", &"x".repeat(MAX_ID_LEN + 1)).is_err());
    }
}
