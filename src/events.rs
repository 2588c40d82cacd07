use tokio::sync::broadcast;

use crate::{
    raft::{AppendEntries, RaftVoteRequest},
    session::GossipRoundState,
    types::{AgentId, ConsensusResult, Proposal, ProposalId, Vote, VoteDecision},
};

/// Phase of the two-step Byzantine broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByzantinePhase {
    /// Proposal announced to all members.
    Prepare,
    /// `2f+1` agreeing votes observed.
    Prepared,
    /// Decision committed.
    Commit,
}

/// Everything the engine tells the outside world. Each variant maps to one bus topic.
#[derive(Debug, Clone)]
pub enum ConsensusEvent {
    /// Full proposal pushed to all known members.
    ProposalBroadcast {
        targets: Vec<AgentId>,
        proposal: Proposal,
    },
    RaftVoteRequest(RaftVoteRequest),
    RaftAppendEntries(AppendEntries),
    Byzantine {
        phase: ByzantinePhase,
        proposal: Proposal,
        /// Decision carried by the prepared/commit phases.
        decision: Option<VoteDecision>,
        votes: usize,
    },
    GossipMessage {
        target: AgentId,
        proposal_id: ProposalId,
        state: GossipRoundState,
        /// Proposal and the votes accumulated so far, forwarded to the target.
        proposal: Proposal,
        votes: Vec<Vote>,
        round: u32,
    },
    VoteCast(Vote),
    ConsensusReached(ConsensusResult),
    /// Engine torn down; listed proposals were dropped without a result.
    Shutdown { dropped: Vec<ProposalId> },
}

impl ConsensusEvent {
    /// Bus topic this event is published under.
    pub fn topic(&self) -> &'static str {
        match self {
            ConsensusEvent::ProposalBroadcast { .. } => "proposal_broadcast",
            ConsensusEvent::RaftVoteRequest(_) => "raft_vote_request",
            ConsensusEvent::RaftAppendEntries(_) => "raft_append_entries",
            ConsensusEvent::Byzantine { phase, .. } => match phase {
                ByzantinePhase::Prepare => "byzantine_prepare",
                ByzantinePhase::Prepared => "byzantine_prepared",
                ByzantinePhase::Commit => "byzantine_commit",
            },
            ConsensusEvent::GossipMessage { .. } => "gossip_message",
            ConsensusEvent::VoteCast(_) => "vote_cast",
            ConsensusEvent::ConsensusReached(_) => "consensus_reached",
            ConsensusEvent::Shutdown { .. } => "consensus_shutdown",
        }
    }
}

/// Outbound message boundary. A transport subscribes and delivers events to peers.
pub trait ConsensusEventBus: Clone + Send + Sync + 'static {
    /// Type returned to consumers that subscribe to consensus events.
    type Receiver;

    fn subscribe(&self) -> Self::Receiver;
    fn publish(&self, event: ConsensusEvent);
}

#[derive(Clone)]
pub struct BroadcastEventBus {
    sender: broadcast::Sender<ConsensusEvent>,
}

impl BroadcastEventBus {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer);
        Self { sender }
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl ConsensusEventBus for BroadcastEventBus {
    type Receiver = broadcast::Receiver<ConsensusEvent>;

    fn subscribe(&self) -> Self::Receiver {
        self.sender.subscribe()
    }

    fn publish(&self, event: ConsensusEvent) {
        let _ = self.sender.send(event);
    }
}
