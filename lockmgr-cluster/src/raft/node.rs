//! The Raft node: elections, replication, commitment, and proposals.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::{oneshot, watch};

use crate::log::LogCommand;
use crate::network::NetworkClient;
use crate::raft::rpc::{
    AppendEntriesRequest, AppendEntriesResponse, RequestVoteRequest, RequestVoteResponse,
};
use crate::raft::state::{PendingProposal, RaftRole, RaftState};
use crate::state::{ApplyOutcome, LockStateMachine};
use crate::types::{LogIndex, NodeId, Term};

/// Resolution of a client proposal.
#[derive(Debug)]
pub enum ProposalResult {
    /// The entry committed and was applied; this is the applier's result.
    Applied(ApplyOutcome),
    /// The node lost leadership before commit, or a later leader overwrote
    /// the entry. The front-end must answer NOT_LEADER.
    Superseded,
}

/// Timing knobs for elections, heartbeats, and inter-node RPC.
#[derive(Debug, Clone)]
pub struct RaftTiming {
    /// Randomized election timeout range.
    pub election_timeout: (Duration, Duration),
    /// Leader heartbeat period.
    pub heartbeat_interval: Duration,
    /// Cap on entries shipped per AppendEntries.
    pub max_entries_per_append: usize,
}

/// A Raft node in the regional group.
///
/// All mutation of term, vote, log, commit index, and role goes through the
/// single `state` lock; outbound RPC always happens outside it. The election
/// timer and the heartbeat loop run as independent tasks, and replication
/// fans out per peer.
pub struct RaftNode {
    id: NodeId,
    peers: HashMap<NodeId, String>,
    timing: RaftTiming,
    state: Mutex<RaftState>,
    machine: Arc<LockStateMachine>,
    network: NetworkClient,
    shutdown: watch::Receiver<bool>,
}

impl RaftNode {
    pub fn new(
        id: NodeId,
        peers: HashMap<NodeId, String>,
        timing: RaftTiming,
        machine: Arc<LockStateMachine>,
        network: NetworkClient,
        shutdown: watch::Receiver<bool>,
    ) -> Arc<Self> {
        let node = Arc::new(Self {
            id,
            peers,
            timing,
            state: Mutex::new(RaftState::new()),
            machine,
            network,
            shutdown,
        });
        node.state.lock().election_deadline = node.next_election_deadline();
        node
    }

    /// Start the election timer and heartbeat loop.
    pub fn spawn_loops(self: &Arc<Self>) {
        tokio::spawn(Arc::clone(self).election_loop());
        tokio::spawn(Arc::clone(self).heartbeat_loop());
    }

    pub fn node_id(&self) -> NodeId {
        self.id
    }

    /// The last known leader, if any.
    pub fn leader_id(&self) -> Option<NodeId> {
        self.state.lock().leader_id
    }

    pub fn is_leader(&self) -> bool {
        self.state.lock().role == RaftRole::Leader
    }

    pub fn current_term(&self) -> Term {
        self.state.lock().current_term
    }

    pub fn commit_index(&self) -> LogIndex {
        self.state.lock().commit_index
    }

    /// Submit a command for replication. Leader-only.
    ///
    /// Returns a handle resolved when the entry commits and is applied, or
    /// with [`ProposalResult::Superseded`] if leadership is lost first. On a
    /// follower, returns the leader hint as the error.
    pub fn propose(
        self: &Arc<Self>,
        command: LogCommand,
    ) -> Result<oneshot::Receiver<ProposalResult>, Option<NodeId>> {
        let rx = {
            let mut state = self.state.lock();
            if state.role != RaftRole::Leader {
                return Err(state.leader_id.filter(|id| *id != self.id));
            }
            let term = state.current_term;
            let index = state.log.append(term, command);
            let (tx, rx) = oneshot::channel();
            state.pending.insert(index, PendingProposal { term, tx });
            tracing::debug!(node_id = self.id, index, term, "proposed entry");
            // A single-node group commits immediately.
            self.advance_commit(&mut state);
            rx
        };
        self.broadcast_append();
        Ok(rx)
    }

    // ---------------------------------------------------------------------
    // RPC handlers (called by the network server)
    // ---------------------------------------------------------------------

    /// Handle a RequestVote RPC from a candidate.
    pub fn handle_request_vote(&self, req: RequestVoteRequest) -> RequestVoteResponse {
        let mut state = self.state.lock();

        if req.term > state.current_term {
            self.step_down(&mut state, req.term);
        }

        let up_to_date = state
            .log
            .candidate_up_to_date(req.last_log_term, req.last_log_index);
        let can_vote = state
            .voted_for
            .map_or(true, |voted| voted == req.candidate_id);

        let vote_granted = req.term == state.current_term && can_vote && up_to_date;
        if vote_granted {
            state.voted_for = Some(req.candidate_id);
            state.election_deadline = self.next_election_deadline();
            tracing::debug!(
                node_id = self.id,
                candidate = req.candidate_id,
                term = req.term,
                "granted vote"
            );
        }

        RequestVoteResponse {
            term: state.current_term,
            vote_granted,
        }
    }

    /// Handle an AppendEntries RPC from a leader.
    pub fn handle_append_entries(&self, req: AppendEntriesRequest) -> AppendEntriesResponse {
        let mut state = self.state.lock();

        if req.term < state.current_term {
            return AppendEntriesResponse {
                term: state.current_term,
                success: false,
                conflict_index: None,
                conflict_term: None,
            };
        }

        if req.term > state.current_term || state.role != RaftRole::Follower {
            self.step_down(&mut state, req.term);
        }
        state.leader_id = Some(req.leader_id);
        state.election_deadline = self.next_election_deadline();

        // Consistency check at prev_log_index.
        match state.log.term_of(req.prev_log_index) {
            None => {
                // Log too short; tell the leader where it ends.
                return AppendEntriesResponse {
                    term: state.current_term,
                    success: false,
                    conflict_index: Some(state.log.last_index() + 1),
                    conflict_term: None,
                };
            }
            Some(term) if term != req.prev_log_term => {
                let conflict_index = state
                    .log
                    .first_index_of_term(term)
                    .unwrap_or(req.prev_log_index);
                return AppendEntriesResponse {
                    term: state.current_term,
                    success: false,
                    conflict_index: Some(conflict_index),
                    conflict_term: Some(term),
                };
            }
            Some(_) => {}
        }

        // Store entries, overwriting any conflicting suffix.
        let last_new_index = req.prev_log_index + req.entries.len() as u64;
        for entry in req.entries {
            match state.log.term_of(entry.index) {
                Some(term) if term == entry.term => {}
                Some(_) => {
                    state.log.truncate_from(entry.index);
                    state.log.push(entry);
                }
                None => state.log.push(entry),
            }
        }

        // Commit only up to the last entry this call vouched for; anything
        // past it in the local log may be a stale suffix.
        if req.leader_commit > state.commit_index {
            state.commit_index = req.leader_commit.min(last_new_index);
            self.apply_committed(&mut state);
        }

        AppendEntriesResponse {
            term: state.current_term,
            success: true,
            conflict_index: None,
            conflict_term: None,
        }
    }

    // ---------------------------------------------------------------------
    // Elections
    // ---------------------------------------------------------------------

    async fn election_loop(self: Arc<Self>) {
        let mut shutdown = self.shutdown.clone();
        loop {
            let wake = {
                let state = self.state.lock();
                if state.role == RaftRole::Leader {
                    // Leaders do not run an election timer; just re-check
                    // after a while in case of step-down.
                    Instant::now() + self.timing.election_timeout.0
                } else {
                    state.election_deadline
                }
            };
            tokio::select! {
                _ = tokio::time::sleep_until(wake.into()) => {}
                _ = shutdown.changed() => return,
            }
            if *shutdown.borrow() {
                return;
            }

            let timed_out = {
                let state = self.state.lock();
                state.role != RaftRole::Leader && Instant::now() >= state.election_deadline
            };
            if timed_out {
                self.start_election();
            }
        }
    }

    fn start_election(self: &Arc<Self>) {
        let request = {
            let mut state = self.state.lock();
            state.role = RaftRole::Candidate;
            state.current_term += 1;
            state.voted_for = Some(self.id);
            state.leader_id = None;
            state.votes_received.clear();
            state.votes_received.insert(self.id);
            state.election_deadline = self.next_election_deadline();

            tracing::info!(
                node_id = self.id,
                term = state.current_term,
                "election timeout, starting election"
            );

            if self.has_majority(state.votes_received.len()) {
                // Single-node group: win immediately.
                self.become_leader(&mut state);
                None
            } else {
                Some(RequestVoteRequest {
                    term: state.current_term,
                    candidate_id: self.id,
                    last_log_index: state.log.last_index(),
                    last_log_term: state.log.last_term(),
                })
            }
        };

        if let Some(request) = request {
            for (&peer, addr) in &self.peers {
                tokio::spawn(Arc::clone(self).solicit_vote(peer, addr.clone(), request.clone()));
            }
        }
    }

    async fn solicit_vote(self: Arc<Self>, peer: NodeId, addr: String, req: RequestVoteRequest) {
        let resp = match self.network.request_vote(&addr, &req).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::debug!(node_id = self.id, peer, error = %e, "vote request failed");
                return;
            }
        };

        let became_leader = {
            let mut state = self.state.lock();
            if resp.term > state.current_term {
                self.step_down(&mut state, resp.term);
                return;
            }
            if state.role != RaftRole::Candidate
                || state.current_term != req.term
                || !resp.vote_granted
            {
                return;
            }
            state.votes_received.insert(peer);
            if self.has_majority(state.votes_received.len()) {
                self.become_leader(&mut state);
                true
            } else {
                false
            }
        };

        if became_leader {
            self.broadcast_append();
        }
    }

    fn become_leader(&self, state: &mut RaftState) {
        state.role = RaftRole::Leader;
        state.leader_id = Some(self.id);
        let next = state.log.last_index() + 1;
        for &peer in self.peers.keys() {
            state.next_index.insert(peer, next);
            state.match_index.insert(peer, 0);
        }

        // Commit anything left over from prior terms via a fresh entry in
        // our own term; prior-term entries are never counted directly.
        let term = state.current_term;
        state.log.append(term, LogCommand::Noop);

        tracing::info!(node_id = self.id, term, "became leader");
        self.advance_commit(state);
    }

    // ---------------------------------------------------------------------
    // Replication
    // ---------------------------------------------------------------------

    async fn heartbeat_loop(self: Arc<Self>) {
        let mut shutdown = self.shutdown.clone();
        let mut ticker = tokio::time::interval(self.timing.heartbeat_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => return,
            }
            if *shutdown.borrow() {
                return;
            }
            if self.state.lock().role == RaftRole::Leader {
                self.broadcast_append();
            }
        }
    }

    /// Kick replication to every peer.
    fn broadcast_append(self: &Arc<Self>) {
        for (&peer, addr) in &self.peers {
            tokio::spawn(Arc::clone(self).replicate(peer, addr.clone()));
        }
    }

    /// Drive one peer forward until it is caught up or an RPC fails; the
    /// next heartbeat retries from wherever this attempt stopped.
    async fn replicate(self: Arc<Self>, peer: NodeId, addr: String) {
        loop {
            let req = {
                let state = self.state.lock();
                if state.role != RaftRole::Leader {
                    return;
                }
                let next = state
                    .next_index
                    .get(&peer)
                    .copied()
                    .unwrap_or(1)
                    .min(state.log.last_index() + 1)
                    .max(1);
                let prev_log_index = next - 1;
                let prev_log_term = match state.log.term_of(prev_log_index) {
                    Some(term) => term,
                    None => return,
                };
                AppendEntriesRequest {
                    term: state.current_term,
                    leader_id: self.id,
                    prev_log_index,
                    prev_log_term,
                    entries: state
                        .log
                        .entries_from(next, self.timing.max_entries_per_append),
                    leader_commit: state.commit_index,
                }
            };

            let sent = req.entries.len() as u64;
            let resp = match self.network.append_entries(&addr, &req).await {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::debug!(node_id = self.id, peer, error = %e, "append entries failed");
                    return;
                }
            };

            let retry = {
                let mut state = self.state.lock();
                if resp.term > state.current_term {
                    self.step_down(&mut state, resp.term);
                    return;
                }
                if state.role != RaftRole::Leader || state.current_term != req.term {
                    return;
                }
                if resp.success {
                    let matched = req.prev_log_index + sent;
                    let entry = state.match_index.entry(peer).or_insert(0);
                    if matched > *entry {
                        *entry = matched;
                    }
                    state.next_index.insert(peer, matched + 1);
                    self.advance_commit(&mut state);
                    matched < state.log.last_index()
                } else {
                    let next = self.backtrack_next_index(&state, &resp, req.prev_log_index);
                    state.next_index.insert(peer, next);
                    true
                }
            };

            if !retry {
                return;
            }
        }
    }

    /// Pick the next index to retry after a consistency rejection, skipping
    /// whole conflicting terms when the hint allows it.
    fn backtrack_next_index(
        &self,
        state: &RaftState,
        resp: &AppendEntriesResponse,
        prev_log_index: LogIndex,
    ) -> LogIndex {
        let next = match resp.conflict_term {
            Some(conflict_term) => match state.log.last_index_of_term(conflict_term) {
                // We also have entries of that term; resend from just past
                // our last one.
                Some(index) => index + 1,
                // We have none; skip the follower's whole run of that term.
                None => resp.conflict_index.unwrap_or(prev_log_index),
            },
            None => resp.conflict_index.unwrap_or(prev_log_index),
        };
        next.max(1)
    }

    // ---------------------------------------------------------------------
    // Commitment and application
    // ---------------------------------------------------------------------

    /// Advance `commit_index` to the highest current-term index replicated
    /// on a majority, then apply.
    fn advance_commit(&self, state: &mut RaftState) {
        let mut committed = state.commit_index;
        for candidate in (state.commit_index + 1)..=state.log.last_index() {
            if state.log.term_of(candidate) != Some(state.current_term) {
                continue;
            }
            let replicas = 1 + self
                .peers
                .keys()
                .filter(|peer| state.match_index.get(peer).copied().unwrap_or(0) >= candidate)
                .count();
            if self.has_majority(replicas) {
                committed = candidate;
            }
        }
        if committed > state.commit_index {
            state.commit_index = committed;
            self.apply_committed(state);
        }
    }

    /// Apply every committed-but-unapplied entry and resolve its handle.
    fn apply_committed(&self, state: &mut RaftState) {
        while self.machine.last_applied() < state.commit_index {
            let index = self.machine.last_applied() + 1;
            let entry = match state.log.entry(index) {
                Some(entry) => entry.clone(),
                None => break,
            };
            let outcome = self.machine.apply(&entry);
            if let Some(pending) = state.pending.remove(&index) {
                let result = if pending.term == entry.term {
                    ProposalResult::Applied(outcome)
                } else {
                    ProposalResult::Superseded
                };
                let _ = pending.tx.send(result);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Role transitions
    // ---------------------------------------------------------------------

    /// Fall back to follower, adopting `new_term` if it is higher. Every
    /// in-flight proposal is drained with `Superseded`; the process never
    /// crashes on a leadership conflict.
    fn step_down(&self, state: &mut RaftState, new_term: Term) {
        if state.role == RaftRole::Leader {
            tracing::info!(
                node_id = self.id,
                term = state.current_term,
                new_term,
                "stepping down"
            );
        }
        if new_term > state.current_term {
            state.current_term = new_term;
            state.voted_for = None;
        }
        state.role = RaftRole::Follower;
        state.votes_received.clear();
        state.election_deadline = self.next_election_deadline();
        for (_, pending) in state.pending.drain() {
            let _ = pending.tx.send(ProposalResult::Superseded);
        }
    }

    fn has_majority(&self, count: usize) -> bool {
        count >= (self.peers.len() + 1) / 2 + 1
    }

    fn next_election_deadline(&self) -> Instant {
        let (min, max) = self.timing.election_timeout;
        let jitter = rand::thread_rng().gen_range(min.as_millis()..=max.as_millis());
        Instant::now() + Duration::from_millis(jitter as u64)
    }
}
