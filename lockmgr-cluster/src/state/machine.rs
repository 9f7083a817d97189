//! Command application logic.

use lockmgr_core::store::{AcquireOutcome, ExtendOutcome, ReleaseOutcome};
use lockmgr_core::{Lock, LockStore};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::log::{LogCommand, LogEntry};
use crate::types::LogIndex;

/// Result of applying a committed entry, resolved into the proposal handle
/// the front-end is awaiting.
#[derive(Debug, Clone)]
pub enum ApplyOutcome {
    /// NOOP entry, or an entry skipped because it was already applied.
    Noop,
    /// Result of an ACQUIRE command.
    Acquire(AcquireOutcome),
    /// Result of a RELEASE command.
    Release(ReleaseOutcome),
    /// Result of an EXTEND command.
    Extend(ExtendOutcome),
}

/// The state machine applier.
///
/// Application is single-threaded relative to the store: `apply` is only
/// invoked while the caller holds the Raft state lock, so the store's write
/// half is uncontended. `CheckLock` reads take the shared half.
#[derive(Debug, Default)]
pub struct LockStateMachine {
    store: RwLock<LockStore>,
    last_applied: AtomicU64,
}

impl LockStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest log index applied to the store.
    pub fn last_applied(&self) -> LogIndex {
        self.last_applied.load(Ordering::Acquire)
    }

    /// Apply a committed entry to the lock store.
    ///
    /// An entry at or below `last_applied` is skipped idempotently, which
    /// matters after leader changes replay the commit cursor.
    pub fn apply(&self, entry: &LogEntry) -> ApplyOutcome {
        if entry.index <= self.last_applied() {
            tracing::debug!(index = entry.index, "skipping already applied entry");
            return ApplyOutcome::Noop;
        }

        tracing::debug!(
            index = entry.index,
            term = entry.term,
            command = entry.command.name(),
            "applying entry"
        );

        // Every command carries the leader's clock reading at proposal
        // time; expiry decisions use it instead of the local clock so any
        // two nodes applying the same entry reach the same state.
        let outcome = match &entry.command {
            LogCommand::Noop => ApplyOutcome::Noop,
            LogCommand::Acquire {
                lock_id,
                client_id,
                region_id,
                fencing_token,
                acquired_at,
                expires_at,
                advisory,
            } => ApplyOutcome::Acquire(self.store.write().acquire_with_token(
                lock_id,
                client_id,
                region_id,
                *fencing_token,
                *expires_at,
                *acquired_at,
                *advisory,
            )),
            LogCommand::Release {
                lock_id,
                fencing_token,
                released_at,
            } => ApplyOutcome::Release(self.store.write().release_by_token(
                lock_id,
                *fencing_token,
                *released_at,
            )),
            LogCommand::Extend {
                lock_id,
                fencing_token,
                expires_at,
                extended_at,
            } => ApplyOutcome::Extend(self.store.write().extend_by_token(
                lock_id,
                *fencing_token,
                *expires_at,
                *extended_at,
            )),
        };

        self.last_applied.store(entry.index, Ordering::Release);
        outcome
    }

    /// Live holder of a lock, if any. Shared-read access for CheckLock.
    pub fn check(&self, lock_id: &str, now_ms: u64) -> Option<Lock> {
        self.store.read().check(lock_id, now_ms).cloned()
    }

    /// Highest non-advisory fencing token ever applied for `lock_id`.
    pub fn token_floor(&self, lock_id: &str) -> u64 {
        self.store.read().token_floor(lock_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_000;

    fn acquire_entry(index: u64, token: u64, client: &str) -> LogEntry {
        LogEntry {
            term: 1,
            index,
            command: LogCommand::Acquire {
                lock_id: "l1".to_string(),
                client_id: client.to_string(),
                region_id: "r1".to_string(),
                fencing_token: token,
                acquired_at: NOW,
                expires_at: NOW + 30_000,
                advisory: false,
            },
        }
    }

    fn release_entry(index: u64, token: u64) -> LogEntry {
        LogEntry {
            term: 1,
            index,
            command: LogCommand::Release {
                lock_id: "l1".to_string(),
                fencing_token: token,
                released_at: NOW + 1,
            },
        }
    }

    #[test]
    fn applies_in_order_and_tracks_cursor() {
        let machine = LockStateMachine::new();

        let outcome = machine.apply(&acquire_entry(1, 1, "c1"));
        assert!(matches!(
            outcome,
            ApplyOutcome::Acquire(AcquireOutcome::Acquired(_))
        ));
        assert_eq!(machine.last_applied(), 1);

        let outcome = machine.apply(&release_entry(2, 1));
        assert!(matches!(
            outcome,
            ApplyOutcome::Release(ReleaseOutcome::Released)
        ));
        assert_eq!(machine.last_applied(), 2);
        assert!(machine.check("l1", NOW + 2).is_none());
    }

    #[test]
    fn skips_already_applied_entries() {
        let machine = LockStateMachine::new();
        machine.apply(&acquire_entry(1, 1, "c1"));

        // Replaying index 1 must not disturb the store.
        let outcome = machine.apply(&acquire_entry(1, 9, "c2"));
        assert!(matches!(outcome, ApplyOutcome::Noop));
        assert_eq!(machine.check("l1", NOW).unwrap().fencing_token, 1);
    }

    #[test]
    fn identical_prefixes_produce_identical_stores() {
        let entries = vec![
            acquire_entry(1, 1, "c1"),
            release_entry(2, 1),
            acquire_entry(3, 2, "c2"),
        ];

        let a = LockStateMachine::new();
        let b = LockStateMachine::new();
        for entry in &entries {
            a.apply(entry);
            b.apply(entry);
        }

        let lock_a = a.check("l1", NOW).expect("held on a");
        let lock_b = b.check("l1", NOW).expect("held on b");
        assert_eq!(lock_a, lock_b);
        assert_eq!(a.token_floor("l1"), b.token_floor("l1"));
    }

    #[test]
    fn extend_entry_moves_expiry() {
        let machine = LockStateMachine::new();
        machine.apply(&acquire_entry(1, 1, "c1"));

        let far = NOW + 120_000;
        let outcome = machine.apply(&LogEntry {
            term: 1,
            index: 2,
            command: LogCommand::Extend {
                lock_id: "l1".to_string(),
                fencing_token: 1,
                expires_at: far,
                extended_at: NOW + 5,
            },
        });
        assert!(matches!(
            outcome,
            ApplyOutcome::Extend(ExtendOutcome::Extended(_))
        ));
        assert_eq!(machine.check("l1", NOW + 10).unwrap().expires_at, far);
    }
}
