//! Status vocabulary for lock operations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a lock operation, returned on every client-facing response.
///
/// There is no exception channel across the RPC boundary; every failure mode
/// is a value of this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockStatus {
    /// Operation completed successfully.
    Ok,
    /// Lock is already held by another client.
    AlreadyLocked,
    /// Lock not found (never acquired, or released, or lapsed).
    NotFound,
    /// Fencing token mismatch.
    InvalidToken,
    /// Lock existed but its lease has lapsed.
    Expired,
    /// Quorum could not be reached across regions.
    QuorumFailed,
    /// This node is not the Raft leader.
    NotLeader,
    /// Operation did not complete in time.
    Timeout,
    /// Invalid input or internal error.
    Error,
}

impl LockStatus {
    /// Whether this status represents a successful operation.
    pub fn is_success(self) -> bool {
        self == LockStatus::Ok
    }

    /// Whether the caller may retry the same request.
    ///
    /// `NotLeader` retries should retarget to the hinted leader; `Timeout`
    /// and `QuorumFailed` retries should back off. Policy denials
    /// (`AlreadyLocked`, `NotFound`, `InvalidToken`, `Expired`) are final.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            LockStatus::QuorumFailed | LockStatus::Timeout | LockStatus::NotLeader
        )
    }
}

impl fmt::Display for LockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LockStatus::Ok => "OK",
            LockStatus::AlreadyLocked => "ALREADY_LOCKED",
            LockStatus::NotFound => "NOT_FOUND",
            LockStatus::InvalidToken => "INVALID_TOKEN",
            LockStatus::Expired => "EXPIRED",
            LockStatus::QuorumFailed => "QUORUM_FAILED",
            LockStatus::NotLeader => "NOT_LEADER",
            LockStatus::Timeout => "TIMEOUT",
            LockStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_only_for_ok() {
        assert!(LockStatus::Ok.is_success());
        assert!(!LockStatus::AlreadyLocked.is_success());
        assert!(!LockStatus::Error.is_success());
    }

    #[test]
    fn retryable_statuses() {
        assert!(LockStatus::NotLeader.is_retryable());
        assert!(LockStatus::Timeout.is_retryable());
        assert!(LockStatus::QuorumFailed.is_retryable());

        assert!(!LockStatus::Ok.is_retryable());
        assert!(!LockStatus::AlreadyLocked.is_retryable());
        assert!(!LockStatus::InvalidToken.is_retryable());
        assert!(!LockStatus::NotFound.is_retryable());
    }
}
