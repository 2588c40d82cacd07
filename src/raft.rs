//! Term and role bookkeeping for the Raft protocol.
//!
//! Only the parts the consensus engine relies on are modelled: randomized
//! elections, stepping down on higher terms, one granted vote per term, and a
//! leader-owned log that proposals are appended to. Counting election votes is
//! left to the caller, which promotes a candidate with [`RaftNode::become_leader`].

use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::{collections::HashMap, time::Duration};
use tokio::time::Instant;
use tracing::info;

use crate::{
    config::RaftConfig,
    error::ConsensusError,
    types::{AgentId, Proposal},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaftRole {
    Follower,
    Candidate,
    Leader,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaftLogEntry {
    pub term: u64,
    /// 1-based log position.
    pub index: u64,
    pub command: Proposal,
}

#[derive(Debug, Clone)]
pub struct RaftState {
    pub current_term: u64,
    pub voted_for: Option<AgentId>,
    pub log: Vec<RaftLogEntry>,
    pub commit_index: u64,
    pub last_applied: u64,
    pub role: RaftRole,
    pub leader_id: Option<AgentId>,
    pub next_index: HashMap<AgentId, u64>,
    pub match_index: HashMap<AgentId, u64>,
}

impl Default for RaftState {
    fn default() -> Self {
        Self {
            current_term: 0,
            voted_for: None,
            log: Vec::new(),
            commit_index: 0,
            last_applied: 0,
            role: RaftRole::Follower,
            leader_id: None,
            next_index: HashMap::new(),
            match_index: HashMap::new(),
        }
    }
}

impl RaftState {
    pub fn last_log_index(&self) -> u64 {
        self.log.last().map(|entry| entry.index).unwrap_or(0)
    }

    pub fn last_log_term(&self) -> u64 {
        self.log.last().map(|entry| entry.term).unwrap_or(0)
    }

    fn term_at(&self, index: u64) -> u64 {
        if index == 0 {
            return 0;
        }
        self.log
            .get(index as usize - 1)
            .map(|entry| entry.term)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaftVoteRequest {
    pub term: u64,
    pub candidate_id: AgentId,
    pub last_log_index: u64,
    pub last_log_term: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendEntries {
    pub term: u64,
    pub leader_id: AgentId,
    pub prev_log_index: u64,
    pub prev_log_term: u64,
    /// Empty for heartbeats.
    pub entries: Vec<RaftLogEntry>,
    pub leader_commit: u64,
}

/// The engine's single Raft participant.
#[derive(Debug)]
pub struct RaftNode {
    agent_id: AgentId,
    config: RaftConfig,
    state: RwLock<RaftState>,
    last_heartbeat: Mutex<Instant>,
}

impl RaftNode {
    pub fn new(agent_id: AgentId, config: RaftConfig) -> Self {
        Self {
            agent_id,
            config,
            state: RwLock::new(RaftState::default()),
            last_heartbeat: Mutex::new(Instant::now()),
        }
    }

    pub fn config(&self) -> &RaftConfig {
        &self.config
    }

    pub fn snapshot(&self) -> RaftState {
        self.state.read().clone()
    }

    pub fn current_term(&self) -> u64 {
        self.state.read().current_term
    }

    pub fn role(&self) -> RaftRole {
        self.state.read().role
    }

    pub fn leader_id(&self) -> Option<AgentId> {
        self.state.read().leader_id.clone()
    }

    pub fn is_leader(&self) -> bool {
        self.role() == RaftRole::Leader
    }

    /// Move to Candidate for a fresh term and vote for ourselves.
    ///
    /// Returns the vote request to broadcast, or `None` when already leading.
    pub fn start_election(&self) -> Option<RaftVoteRequest> {
        let mut state = self.state.write();
        if state.role == RaftRole::Leader {
            return None;
        }
        state.current_term += 1;
        state.voted_for = Some(self.agent_id.clone());
        state.role = RaftRole::Candidate;
        state.leader_id = None;
        self.touch();

        info!(
            "Agent {} starting election for term {}",
            self.agent_id, state.current_term
        );
        Some(RaftVoteRequest {
            term: state.current_term,
            candidate_id: self.agent_id.clone(),
            last_log_index: state.last_log_index(),
            last_log_term: state.last_log_term(),
        })
    }

    /// Promote a candidate that won its election.
    ///
    /// Returns the first heartbeat to announce leadership, or `None` if this node
    /// is not a candidate.
    pub fn become_leader(&self, members: &[AgentId]) -> Option<AppendEntries> {
        let mut state = self.state.write();
        if state.role != RaftRole::Candidate {
            return None;
        }
        state.role = RaftRole::Leader;
        state.leader_id = Some(self.agent_id.clone());

        let next = state.last_log_index() + 1;
        let followers = members.iter().filter(|member| **member != self.agent_id);
        state.next_index = followers.clone().map(|id| (id.clone(), next)).collect();
        state.match_index = followers.map(|id| (id.clone(), 0)).collect();

        info!(
            "Agent {} became leader for term {}",
            self.agent_id, state.current_term
        );
        Some(self.heartbeat_locked(&state))
    }

    /// Record a message from a leader claiming `term`.
    ///
    /// Steps down on a higher term, or on an equal one while campaigning. Returns
    /// false when the term is stale and the message was ignored.
    pub fn observe_leader(&self, term: u64, leader_id: AgentId) -> bool {
        let mut state = self.state.write();
        if term < state.current_term {
            return false;
        }
        if term > state.current_term {
            state.current_term = term;
            state.voted_for = None;
        }
        if state.role != RaftRole::Follower {
            info!(
                "Agent {} stepping down to follower in term {term}",
                self.agent_id
            );
        }
        state.role = RaftRole::Follower;
        state.leader_id = Some(leader_id);
        self.touch();
        true
    }

    /// Decide whether to grant our vote to a candidate.
    ///
    /// At most one candidate per term, and only if its log is at least as up to
    /// date as ours.
    pub fn handle_vote_request(&self, request: &RaftVoteRequest) -> bool {
        let mut state = self.state.write();
        if request.term < state.current_term {
            return false;
        }
        if request.term > state.current_term {
            state.current_term = request.term;
            state.voted_for = None;
            state.role = RaftRole::Follower;
            state.leader_id = None;
        }

        let up_to_date = (request.last_log_term, request.last_log_index)
            >= (state.last_log_term(), state.last_log_index());
        let free = state
            .voted_for
            .as_ref()
            .is_none_or(|voted| *voted == request.candidate_id);
        if !(up_to_date && free) {
            return false;
        }
        state.voted_for = Some(request.candidate_id.clone());
        self.touch();
        true
    }

    pub(crate) fn require_leader(&self) -> Result<u64, ConsensusError> {
        let state = self.state.read();
        if state.role != RaftRole::Leader {
            return Err(ConsensusError::NotLeader {
                leader: state.leader_id.clone(),
            });
        }
        Ok(state.current_term)
    }

    /// Append `proposal` to the leader's log and build the replication message.
    pub(crate) fn append_proposal(
        &self,
        proposal: &mut Proposal,
    ) -> Result<AppendEntries, ConsensusError> {
        let mut state = self.state.write();
        if state.role != RaftRole::Leader {
            return Err(ConsensusError::NotLeader {
                leader: state.leader_id.clone(),
            });
        }
        let prev_log_index = state.last_log_index();
        let prev_log_term = state.term_at(prev_log_index);
        let index = prev_log_index + 1;

        proposal.term = Some(state.current_term);
        proposal.log_index = Some(index);
        let entry = RaftLogEntry {
            term: state.current_term,
            index,
            command: proposal.clone(),
        };
        state.log.push(entry.clone());

        Ok(AppendEntries {
            term: state.current_term,
            leader_id: self.agent_id.clone(),
            prev_log_index,
            prev_log_term,
            entries: vec![entry],
            leader_commit: state.commit_index,
        })
    }

    /// Empty append-entries, only while leading.
    pub(crate) fn heartbeat(&self) -> Option<AppendEntries> {
        let state = self.state.read();
        (state.role == RaftRole::Leader).then(|| self.heartbeat_locked(&state))
    }

    fn heartbeat_locked(&self, state: &RaftState) -> AppendEntries {
        AppendEntries {
            term: state.current_term,
            leader_id: self.agent_id.clone(),
            prev_log_index: state.last_log_index(),
            prev_log_term: state.last_log_term(),
            entries: Vec::new(),
            leader_commit: state.commit_index,
        }
    }

    /// Mark the entry at `index` (and everything before it) committed and applied.
    pub(crate) fn commit(&self, index: u64) {
        let mut state = self.state.write();
        if index > state.commit_index && index <= state.last_log_index() {
            state.commit_index = index;
            state.last_applied = index;
            for matched in state.match_index.values_mut() {
                *matched = (*matched).max(index);
            }
        }
    }

    /// Random election timeout in `[election_timeout, 2 × election_timeout]`.
    pub(crate) fn election_timeout(&self) -> Duration {
        let base = self.config.election_timeout.as_millis() as u64;
        let millis = rand::thread_rng().gen_range(base..=base * 2);
        Duration::from_millis(millis)
    }

    pub(crate) fn since_heartbeat(&self) -> Duration {
        self.last_heartbeat.lock().elapsed()
    }

    /// Forget a leader that has been silent longer than `leader_timeout`.
    pub(crate) fn expire_silent_leader(&self) {
        if self.since_heartbeat() < self.config.leader_timeout {
            return;
        }
        let mut state = self.state.write();
        if state.role == RaftRole::Follower && state.leader_id.take().is_some() {
            info!("Agent {} lost contact with leader", self.agent_id);
        }
    }

    fn touch(&self) {
        *self.last_heartbeat.lock() = Instant::now();
    }
}
