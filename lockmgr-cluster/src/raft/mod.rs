//! Raft consensus for the regional lock group.
//!
//! This module implements leader election and log replication directly:
//! - `rpc`: the RequestVote/AppendEntries wire messages
//! - `state`: the mutable Raft state behind the single state lock
//! - `node`: the RaftNode driving timers, elections, and replication

mod node;
mod rpc;
mod state;

pub use node::{ProposalResult, RaftNode, RaftTiming};
pub use rpc::{
    AppendEntriesRequest, AppendEntriesResponse, RequestVoteRequest, RequestVoteResponse,
};
pub use state::{RaftRole, RaftState};
