//! The mutable Raft state, guarded by the node's single state lock.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tokio::sync::oneshot;

use crate::log::RaftLog;
use crate::raft::node::ProposalResult;
use crate::types::{LogIndex, NodeId, Term};

/// Role of a Raft node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaftRole {
    /// Accepting entries from the leader.
    Follower,
    /// Running for leader election.
    Candidate,
    /// Accepting client proposals.
    Leader,
}

/// A client proposal awaiting commit, resolved by the applier.
#[derive(Debug)]
pub struct PendingProposal {
    /// Term the entry was proposed in; a committed entry with a different
    /// term at this index means the proposal was overwritten.
    pub term: Term,
    /// Handle the front-end is awaiting.
    pub tx: oneshot::Sender<ProposalResult>,
}

/// All mutable Raft state: persistent-in-spirit fields (`current_term`,
/// `voted_for`, the log), the volatile commit cursor, and leader-only
/// replication bookkeeping. Mutated only under the node's state lock.
#[derive(Debug)]
pub struct RaftState {
    /// Latest term this node has seen. Monotonic.
    pub current_term: Term,
    /// Candidate voted for in the current term, if any.
    pub voted_for: Option<NodeId>,
    /// The replicated log.
    pub log: RaftLog,
    /// Highest index known committed.
    pub commit_index: LogIndex,
    /// Current role.
    pub role: RaftRole,
    /// Last known leader, used for client redirection hints.
    pub leader_id: Option<NodeId>,
    /// Leader-only: next log index to send to each peer.
    pub next_index: HashMap<NodeId, LogIndex>,
    /// Leader-only: highest index known replicated on each peer.
    pub match_index: HashMap<NodeId, LogIndex>,
    /// Candidate-only: peers (and self) that granted a vote this term.
    pub votes_received: HashSet<NodeId>,
    /// When the election timer fires next.
    pub election_deadline: Instant,
    /// Proposals awaiting commit, keyed by log index.
    pub pending: HashMap<LogIndex, PendingProposal>,
}

impl RaftState {
    /// Blank-slate state at process start: follower, term 0, empty log.
    pub fn new() -> Self {
        Self {
            current_term: 0,
            voted_for: None,
            log: RaftLog::new(),
            commit_index: 0,
            role: RaftRole::Follower,
            leader_id: None,
            next_index: HashMap::new(),
            match_index: HashMap::new(),
            votes_received: HashSet::new(),
            election_deadline: Instant::now(),
            pending: HashMap::new(),
        }
    }
}

impl Default for RaftState {
    fn default() -> Self {
        Self::new()
    }
}
