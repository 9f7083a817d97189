//! Raft RPC wire messages.
//!
//! These structs are serde_json-encoded into the `bytes` payload of the
//! RaftService protobuf messages; their field names are wire-stable.

use serde::{Deserialize, Serialize};

use crate::log::LogEntry;
use crate::types::{LogIndex, NodeId, Term};

/// Vote solicitation from a candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestVoteRequest {
    /// Candidate's term.
    pub term: Term,
    /// Candidate requesting the vote.
    pub candidate_id: NodeId,
    /// Index of the candidate's last log entry.
    pub last_log_index: LogIndex,
    /// Term of the candidate's last log entry.
    pub last_log_term: Term,
}

/// Vote reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestVoteResponse {
    /// Voter's current term, for the candidate to update itself.
    pub term: Term,
    /// Whether the vote was granted.
    pub vote_granted: bool,
}

/// Log replication / heartbeat from the leader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesRequest {
    /// Leader's term.
    pub term: Term,
    /// Leader id, so followers can redirect clients.
    pub leader_id: NodeId,
    /// Index of the entry immediately preceding the new ones.
    pub prev_log_index: LogIndex,
    /// Term of the entry at `prev_log_index`.
    pub prev_log_term: Term,
    /// Entries to store; empty for heartbeats.
    pub entries: Vec<LogEntry>,
    /// Leader's commit index.
    pub leader_commit: LogIndex,
}

/// Replication reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    /// Follower's current term, for the leader to update itself.
    pub term: Term,
    /// True when the follower's log matched `prev_log_index`/`prev_log_term`
    /// and the entries were stored.
    pub success: bool,
    /// On rejection: the index the leader should back `next_index` up to.
    pub conflict_index: Option<LogIndex>,
    /// On rejection: the term of the conflicting entry, so the leader can
    /// skip the whole term instead of decrementing one index at a time.
    pub conflict_term: Option<Term>,
}
