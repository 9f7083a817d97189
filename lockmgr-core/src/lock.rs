//! The lock record held by the store.

use serde::{Deserialize, Serialize};

/// A held lock (lease).
///
/// A lock is either held or absent; there is no released tombstone. The
/// record is replicated inside ACQUIRE log entries, so it must stay
/// serde-stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    /// Client that holds the lock.
    pub holder_client_id: String,
    /// Region whose leader granted the lock.
    pub region_id: String,
    /// Fencing token issued with this acquisition. Strictly increasing per
    /// lock id across the lifetime of the manager.
    pub fencing_token: u64,
    /// Leader wall-clock timestamp at acquisition, epoch milliseconds.
    pub acquired_at: u64,
    /// Lease expiry, epoch milliseconds, assigned by the leader.
    pub expires_at: u64,
    /// True for entries recorded on behalf of another region's leader during
    /// cross-region confirmation. Advisory entries block local acquisition
    /// but do not feed fencing-token allocation.
    pub advisory: bool,
}

impl Lock {
    /// Whether the lease has lapsed at `now_ms`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at
    }

    /// Remaining lease time at `now_ms`, zero if lapsed.
    pub fn remaining_ttl_ms(&self, now_ms: u64) -> u64 {
        self.expires_at.saturating_sub(now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Lock {
        Lock {
            holder_client_id: "client-1".to_string(),
            region_id: "us-east".to_string(),
            fencing_token: 7,
            acquired_at: 1_000,
            expires_at: 31_000,
            advisory: false,
        }
    }

    #[test]
    fn expiry_is_inclusive_at_the_boundary() {
        let lock = sample();
        assert!(!lock.is_expired(30_999));
        assert!(lock.is_expired(31_000));
        assert!(lock.is_expired(31_001));
    }

    #[test]
    fn remaining_ttl_saturates() {
        let lock = sample();
        assert_eq!(lock.remaining_ttl_ms(1_000), 30_000);
        assert_eq!(lock.remaining_ttl_ms(31_000), 0);
        assert_eq!(lock.remaining_ttl_ms(40_000), 0);
    }
}
