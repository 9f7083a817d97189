//! The in-memory lock store.
//!
//! The store is the replicated state: it is mutated only by the state
//! machine applier, in Raft log order, which makes every mutation
//! deterministic across nodes. Expiry is lazy - no timers run here; an
//! entry whose lease has lapsed is treated as absent by the next operation
//! that touches its lock id.

use crate::lock::Lock;
use std::collections::HashMap;

/// Result of applying an ACQUIRE command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// No live holder existed; the lock is now held with the proposed token.
    Acquired(Lock),
    /// The same client in the same region already holds the lock; the
    /// existing grant is returned unchanged and the proposed token is
    /// burned.
    Reentrant(Lock),
    /// Another holder has a live lease.
    Held(Lock),
}

/// Result of applying a RELEASE command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The entry was removed.
    Released,
    /// No live entry for the lock id.
    NotFound,
    /// Token mismatch; the entry is left in place.
    InvalidToken {
        /// Token of the current holder.
        held_token: u64,
    },
}

/// Result of applying an EXTEND command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtendOutcome {
    /// The lease expiry was moved forward.
    Extended(Lock),
    /// No entry for the lock id.
    NotFound,
    /// An entry existed but its lease had already lapsed.
    Expired,
    /// Token mismatch; the entry is left in place.
    InvalidToken {
        /// Token of the current holder.
        held_token: u64,
    },
}

/// Mapping of `lock_id -> Lock` plus the per-lock fencing token floor.
///
/// The floor records the highest non-advisory token ever applied for a lock
/// id and is never pruned, so token allocation stays strictly increasing
/// across release/re-acquire cycles and across leader failover (the floor is
/// replayed identically on every node from the committed log).
#[derive(Debug, Clone, Default)]
pub struct LockStore {
    locks: HashMap<String, Lock>,
    floors: HashMap<String, u64>,
}

impl LockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies an ACQUIRE with a leader-assigned token and expiry.
    ///
    /// An expired entry is purged and treated as absent. A live entry held
    /// by the same `client_id`+`region_id` pair is a re-entrant success.
    #[allow(clippy::too_many_arguments)]
    pub fn acquire_with_token(
        &mut self,
        lock_id: &str,
        client_id: &str,
        region_id: &str,
        fencing_token: u64,
        expires_at: u64,
        now_ms: u64,
        advisory: bool,
    ) -> AcquireOutcome {
        if let Some(existing) = self.locks.get(lock_id) {
            if !existing.is_expired(now_ms) {
                if existing.holder_client_id == client_id && existing.region_id == region_id {
                    return AcquireOutcome::Reentrant(existing.clone());
                }
                return AcquireOutcome::Held(existing.clone());
            }
            self.locks.remove(lock_id);
        }

        let lock = Lock {
            holder_client_id: client_id.to_string(),
            region_id: region_id.to_string(),
            fencing_token,
            acquired_at: now_ms,
            expires_at,
            advisory,
        };
        self.locks.insert(lock_id.to_string(), lock.clone());

        if !advisory {
            let floor = self.floors.entry(lock_id.to_string()).or_insert(0);
            *floor = (*floor).max(fencing_token);
        }

        AcquireOutcome::Acquired(lock)
    }

    /// Applies a RELEASE. The entry is removed only on an exact token match.
    pub fn release_by_token(
        &mut self,
        lock_id: &str,
        fencing_token: u64,
        now_ms: u64,
    ) -> ReleaseOutcome {
        match self.locks.get(lock_id) {
            None => ReleaseOutcome::NotFound,
            Some(existing) if existing.is_expired(now_ms) => {
                self.locks.remove(lock_id);
                ReleaseOutcome::NotFound
            }
            Some(existing) if existing.fencing_token != fencing_token => {
                ReleaseOutcome::InvalidToken {
                    held_token: existing.fencing_token,
                }
            }
            Some(_) => {
                self.locks.remove(lock_id);
                ReleaseOutcome::Released
            }
        }
    }

    /// Applies an EXTEND: moves the lease expiry forward iff the token
    /// matches a live entry.
    pub fn extend_by_token(
        &mut self,
        lock_id: &str,
        fencing_token: u64,
        new_expires_at: u64,
        now_ms: u64,
    ) -> ExtendOutcome {
        match self.locks.get_mut(lock_id) {
            None => ExtendOutcome::NotFound,
            Some(existing) if existing.is_expired(now_ms) => {
                self.locks.remove(lock_id);
                ExtendOutcome::Expired
            }
            Some(existing) if existing.fencing_token != fencing_token => {
                ExtendOutcome::InvalidToken {
                    held_token: existing.fencing_token,
                }
            }
            Some(existing) => {
                existing.expires_at = new_expires_at;
                ExtendOutcome::Extended(existing.clone())
            }
        }
    }

    /// Returns the live holder of a lock, filtering lapsed entries.
    pub fn check(&self, lock_id: &str, now_ms: u64) -> Option<&Lock> {
        self.locks
            .get(lock_id)
            .filter(|lock| !lock.is_expired(now_ms))
    }

    /// Highest non-advisory fencing token ever applied for `lock_id`.
    pub fn token_floor(&self, lock_id: &str) -> u64 {
        self.floors.get(lock_id).copied().unwrap_or(0)
    }

    /// Number of entries, including lapsed ones not yet purged.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Drops all entries and floors. Test-only escape hatch.
    pub fn clear(&mut self) {
        self.locks.clear();
        self.floors.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_000;
    const LATER: u64 = 40_000;

    fn acquire(store: &mut LockStore, client: &str, token: u64) -> AcquireOutcome {
        store.acquire_with_token("l1", client, "r1", token, NOW + 30_000, NOW, false)
    }

    #[test]
    fn acquire_then_check_then_release() {
        let mut store = LockStore::new();

        let outcome = acquire(&mut store, "c1", 1);
        assert!(matches!(outcome, AcquireOutcome::Acquired(ref l) if l.fencing_token == 1));

        let held = store.check("l1", NOW).expect("lock should be held");
        assert_eq!(held.holder_client_id, "c1");
        assert_eq!(held.fencing_token, 1);

        assert_eq!(store.release_by_token("l1", 1, NOW), ReleaseOutcome::Released);
        assert!(store.check("l1", NOW).is_none());
    }

    #[test]
    fn contended_acquire_reports_holder() {
        let mut store = LockStore::new();
        acquire(&mut store, "c1", 1);

        let outcome = acquire(&mut store, "c2", 2);
        match outcome {
            AcquireOutcome::Held(holder) => assert_eq!(holder.holder_client_id, "c1"),
            other => panic!("expected Held, got {:?}", other),
        }
    }

    #[test]
    fn reacquire_by_same_holder_is_reentrant() {
        let mut store = LockStore::new();
        acquire(&mut store, "c1", 1);

        let outcome = acquire(&mut store, "c1", 2);
        match outcome {
            AcquireOutcome::Reentrant(lock) => assert_eq!(lock.fencing_token, 1),
            other => panic!("expected Reentrant, got {:?}", other),
        }
        // The burned token must not move the floor.
        assert_eq!(store.token_floor("l1"), 1);
    }

    #[test]
    fn same_client_other_region_is_contention() {
        let mut store = LockStore::new();
        acquire(&mut store, "c1", 1);

        let outcome = store.acquire_with_token("l1", "c1", "r2", 2, NOW + 30_000, NOW, false);
        assert!(matches!(outcome, AcquireOutcome::Held(_)));
    }

    #[test]
    fn expired_entry_can_be_taken_over() {
        let mut store = LockStore::new();
        acquire(&mut store, "c1", 1);

        let outcome = store.acquire_with_token("l1", "c2", "r1", 2, LATER + 30_000, LATER, false);
        assert!(matches!(outcome, AcquireOutcome::Acquired(ref l) if l.fencing_token == 2));
        assert_eq!(store.check("l1", LATER).unwrap().holder_client_id, "c2");
    }

    #[test]
    fn release_with_stale_token_is_rejected() {
        let mut store = LockStore::new();
        acquire(&mut store, "c1", 1);
        store.release_by_token("l1", 1, NOW);
        acquire(&mut store, "c2", 2);

        assert_eq!(
            store.release_by_token("l1", 1, NOW),
            ReleaseOutcome::InvalidToken { held_token: 2 }
        );
        // Stale release must not remove the live entry.
        assert_eq!(store.check("l1", NOW).unwrap().holder_client_id, "c2");

        assert_eq!(store.release_by_token("l1", 2, NOW), ReleaseOutcome::Released);
    }

    #[test]
    fn release_of_absent_or_expired_is_not_found() {
        let mut store = LockStore::new();
        assert_eq!(store.release_by_token("l1", 1, NOW), ReleaseOutcome::NotFound);

        acquire(&mut store, "c1", 1);
        assert_eq!(store.release_by_token("l1", 1, LATER), ReleaseOutcome::NotFound);
    }

    #[test]
    fn check_filters_expired_entries() {
        let mut store = LockStore::new();
        acquire(&mut store, "c1", 1);
        assert!(store.check("l1", NOW).is_some());
        assert!(store.check("l1", LATER).is_none());
    }

    #[test]
    fn extend_moves_expiry_with_matching_token() {
        let mut store = LockStore::new();
        acquire(&mut store, "c1", 1);

        let outcome = store.extend_by_token("l1", 1, NOW + 60_000, NOW + 10_000);
        match outcome {
            ExtendOutcome::Extended(lock) => assert_eq!(lock.expires_at, NOW + 60_000),
            other => panic!("expected Extended, got {:?}", other),
        }
        assert!(store.check("l1", NOW + 45_000).is_some());
    }

    #[test]
    fn extend_rejects_wrong_token_and_lapsed_lease() {
        let mut store = LockStore::new();
        acquire(&mut store, "c1", 1);

        assert_eq!(
            store.extend_by_token("l1", 9, NOW + 60_000, NOW),
            ExtendOutcome::InvalidToken { held_token: 1 }
        );
        assert_eq!(
            store.extend_by_token("l1", 1, LATER + 60_000, LATER),
            ExtendOutcome::Expired
        );
        assert_eq!(
            store.extend_by_token("missing", 1, NOW + 60_000, NOW),
            ExtendOutcome::NotFound
        );
    }

    #[test]
    fn token_floor_survives_release() {
        let mut store = LockStore::new();
        acquire(&mut store, "c1", 5);
        store.release_by_token("l1", 5, NOW);

        assert!(store.check("l1", NOW).is_none());
        assert_eq!(store.token_floor("l1"), 5);
    }

    #[test]
    fn advisory_entries_block_but_do_not_raise_floor() {
        let mut store = LockStore::new();
        let outcome = store.acquire_with_token("l1", "c1", "remote", 9, NOW + 30_000, NOW, true);
        assert!(matches!(outcome, AcquireOutcome::Acquired(_)));
        assert_eq!(store.token_floor("l1"), 0);

        let outcome = acquire(&mut store, "c2", 1);
        assert!(matches!(outcome, AcquireOutcome::Held(ref l) if l.advisory));
    }
}
