//! Wall-clock access.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as epoch milliseconds.
///
/// Lease semantics assume leader/follower skew bounded by half the election
/// timeout; followers never re-derive expiry from their own clock at apply
/// time, they trust the leader-assigned `expires_at`.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
