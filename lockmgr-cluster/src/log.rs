//! The replicated log: commands, entries, and the in-memory log store.
//!
//! Every state mutation of the lock store is a [`LogCommand`] serialized
//! into the Raft log and applied on all nodes in the same order. Commands
//! cross the wire inside AppendEntries payloads, so their serde shape is
//! the wire contract.

use serde::{Deserialize, Serialize};

use crate::types::{LogIndex, Term};

/// Commands that are replicated through Raft consensus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogCommand {
    /// No operation - appended by a fresh leader to commit entries from
    /// prior terms.
    Noop,

    /// Acquire a lock with a leader-assigned fencing token and expiry.
    Acquire {
        /// Lock identifier.
        lock_id: String,
        /// Client requesting the lock.
        client_id: String,
        /// Region whose leader granted the lock.
        region_id: String,
        /// Pre-assigned fencing token.
        fencing_token: u64,
        /// Leader wall-clock at proposal, epoch milliseconds. The applier
        /// uses this (never its own clock) so every node decides expiry of
        /// the previous holder identically.
        acquired_at: u64,
        /// Lease expiry, epoch milliseconds.
        expires_at: u64,
        /// Set for entries recording a remote region's holder after a
        /// cross-region commit.
        advisory: bool,
    },

    /// Release a lock if the fencing token matches.
    Release {
        /// Lock identifier.
        lock_id: String,
        /// Token the releaser was issued.
        fencing_token: u64,
        /// Leader wall-clock at proposal, epoch milliseconds.
        released_at: u64,
    },

    /// Move a lease expiry forward if the fencing token matches.
    Extend {
        /// Lock identifier.
        lock_id: String,
        /// Token the holder was issued.
        fencing_token: u64,
        /// New lease expiry, epoch milliseconds.
        expires_at: u64,
        /// Leader wall-clock at proposal, epoch milliseconds.
        extended_at: u64,
    },
}

impl LogCommand {
    /// Get a human-readable name for this command type.
    pub fn name(&self) -> &'static str {
        match self {
            LogCommand::Noop => "Noop",
            LogCommand::Acquire { .. } => "Acquire",
            LogCommand::Release { .. } => "Release",
            LogCommand::Extend { .. } => "Extend",
        }
    }

    /// Get the lock ID if this command targets a lock.
    pub fn lock_id(&self) -> Option<&str> {
        match self {
            LogCommand::Noop => None,
            LogCommand::Acquire { lock_id, .. }
            | LogCommand::Release { lock_id, .. }
            | LogCommand::Extend { lock_id, .. } => Some(lock_id),
        }
    }
}

/// A single entry in the Raft log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Leader's term at proposal time.
    pub term: Term,
    /// 1-based position in the log.
    pub index: LogIndex,
    /// The replicated command.
    pub command: LogCommand,
}

/// The in-memory Raft log, 1-indexed.
///
/// Index 0 is the sentinel "empty log" position with term 0. Committed
/// entries are never rewritten; an uncommitted suffix may be overwritten
/// when a new leader's entries conflict.
#[derive(Debug, Clone, Default)]
pub struct RaftLog {
    entries: Vec<LogEntry>,
}

impl RaftLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the last entry, 0 when empty.
    pub fn last_index(&self) -> LogIndex {
        self.entries.len() as LogIndex
    }

    /// Term of the last entry, 0 when empty.
    pub fn last_term(&self) -> Term {
        self.entries.last().map(|e| e.term).unwrap_or(0)
    }

    /// Term of the entry at `index`. `Some(0)` for the sentinel index 0,
    /// `None` past the end of the log.
    pub fn term_of(&self, index: LogIndex) -> Option<Term> {
        if index == 0 {
            return Some(0);
        }
        self.entries.get(index as usize - 1).map(|e| e.term)
    }

    /// The entry at `index`, if present.
    pub fn entry(&self, index: LogIndex) -> Option<&LogEntry> {
        if index == 0 {
            return None;
        }
        self.entries.get(index as usize - 1)
    }

    /// Append a new leader-proposed command, returning its index.
    pub fn append(&mut self, term: Term, command: LogCommand) -> LogIndex {
        let index = self.last_index() + 1;
        self.entries.push(LogEntry {
            term,
            index,
            command,
        });
        index
    }

    /// Append a replicated entry at the tail. The entry's index must be
    /// exactly one past the current last index.
    pub fn push(&mut self, entry: LogEntry) {
        debug_assert_eq!(entry.index, self.last_index() + 1);
        self.entries.push(entry);
    }

    /// Drop the entry at `index` and everything after it.
    pub fn truncate_from(&mut self, index: LogIndex) {
        if index == 0 {
            self.entries.clear();
        } else {
            self.entries.truncate(index as usize - 1);
        }
    }

    /// Entries starting at `index`, capped at `max`.
    pub fn entries_from(&self, index: LogIndex, max: usize) -> Vec<LogEntry> {
        if index == 0 || index > self.last_index() {
            return Vec::new();
        }
        self.entries[index as usize - 1..]
            .iter()
            .take(max)
            .cloned()
            .collect()
    }

    /// First index carrying `term`, used for conflict hints.
    pub fn first_index_of_term(&self, term: Term) -> Option<LogIndex> {
        self.entries.iter().find(|e| e.term == term).map(|e| e.index)
    }

    /// Last index carrying `term`, used for leader-side conflict skipping.
    pub fn last_index_of_term(&self, term: Term) -> Option<LogIndex> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.term == term)
            .map(|e| e.index)
    }

    /// Whether a candidate's log is at least as up-to-date as this one:
    /// higher last term wins, equal terms compare last index.
    pub fn candidate_up_to_date(
        &self,
        candidate_last_term: Term,
        candidate_last_index: LogIndex,
    ) -> bool {
        candidate_last_term > self.last_term()
            || (candidate_last_term == self.last_term()
                && candidate_last_index >= self.last_index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_with_terms(terms: &[Term]) -> RaftLog {
        let mut log = RaftLog::new();
        for &term in terms {
            log.append(term, LogCommand::Noop);
        }
        log
    }

    #[test]
    fn empty_log_sentinel() {
        let log = RaftLog::new();
        assert_eq!(log.last_index(), 0);
        assert_eq!(log.last_term(), 0);
        assert_eq!(log.term_of(0), Some(0));
        assert_eq!(log.term_of(1), None);
    }

    #[test]
    fn append_assigns_sequential_indices() {
        let mut log = RaftLog::new();
        assert_eq!(log.append(1, LogCommand::Noop), 1);
        assert_eq!(
            log.append(
                1,
                LogCommand::Release {
                    lock_id: "l1".to_string(),
                    fencing_token: 3,
                    released_at: 1_000,
                }
            ),
            2
        );
        assert_eq!(log.last_index(), 2);
        assert_eq!(log.term_of(2), Some(1));
    }

    #[test]
    fn truncate_drops_suffix() {
        let mut log = log_with_terms(&[1, 1, 2, 2]);
        log.truncate_from(3);
        assert_eq!(log.last_index(), 2);
        assert_eq!(log.last_term(), 1);

        log.truncate_from(0);
        assert_eq!(log.last_index(), 0);
    }

    #[test]
    fn entries_from_respects_cap() {
        let log = log_with_terms(&[1, 1, 1, 2, 2]);
        let slice = log.entries_from(2, 2);
        assert_eq!(slice.len(), 2);
        assert_eq!(slice[0].index, 2);
        assert_eq!(slice[1].index, 3);

        assert!(log.entries_from(6, 10).is_empty());
    }

    #[test]
    fn term_boundaries() {
        let log = log_with_terms(&[1, 1, 2, 2, 3]);
        assert_eq!(log.first_index_of_term(2), Some(3));
        assert_eq!(log.last_index_of_term(2), Some(4));
        assert_eq!(log.first_index_of_term(4), None);
    }

    #[test]
    fn up_to_date_comparison() {
        let log = log_with_terms(&[1, 2, 2]);

        // Higher last term always wins, regardless of length.
        assert!(log.candidate_up_to_date(3, 1));
        // Equal last term compares length.
        assert!(log.candidate_up_to_date(2, 3));
        assert!(log.candidate_up_to_date(2, 4));
        assert!(!log.candidate_up_to_date(2, 2));
        // Lower last term loses even with a longer log.
        assert!(!log.candidate_up_to_date(1, 10));
    }
}
