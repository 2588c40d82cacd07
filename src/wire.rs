//! Protobuf encoding of bus events for transports that carry them between peers.
//!
//! Outbound, every [`ConsensusEvent`] becomes a [`WireEnvelope`] tagged with its
//! topic. Inbound, peers' `vote_cast` envelopes decode back into [`Vote`]s for
//! the engine's remote-vote path.

use prost::Message;

use crate::{
    error::ConsensusError,
    events::{ByzantinePhase, ConsensusEvent},
    raft::{AppendEntries, RaftLogEntry, RaftVoteRequest},
    types::{ConsensusResult, Proposal, ProposalType, Vote, VoteDecision},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum WireDecision {
    /// Field absent on the wire; never a valid decision.
    Unspecified = 0,
    Approve = 1,
    Reject = 2,
    Abstain = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum WireProposalType {
    Unspecified = 0,
    TaskAssignment = 1,
    ResourceAllocation = 2,
    ConfigurationChange = 3,
    AgentElection = 4,
    WorkflowDecision = 5,
    SystemUpdate = 6,
    EmergencyAction = 7,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum WireByzantinePhase {
    Unspecified = 0,
    Prepare = 1,
    Prepared = 2,
    Commit = 3,
}

#[derive(Clone, PartialEq, Message)]
pub struct WireProposal {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub proposer_id: String,
    #[prost(enumeration = "WireProposalType", tag = "3")]
    pub proposal_type: i32,
    #[prost(bytes = "vec", tag = "4")]
    pub content: Vec<u8>,
    #[prost(uint64, tag = "5")]
    pub created_at: u64,
    #[prost(uint64, tag = "6")]
    pub deadline: u64,
    #[prost(uint64, optional, tag = "7")]
    pub term: Option<u64>,
    #[prost(uint64, optional, tag = "8")]
    pub log_index: Option<u64>,
    #[prost(bytes = "vec", optional, tag = "9")]
    pub signature: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct WireVote {
    #[prost(string, tag = "1")]
    pub proposal_id: String,
    #[prost(string, tag = "2")]
    pub voter_id: String,
    #[prost(enumeration = "WireDecision", tag = "3")]
    pub decision: i32,
    #[prost(uint64, tag = "4")]
    pub cast_at: u64,
    #[prost(uint64, optional, tag = "5")]
    pub term: Option<u64>,
    #[prost(bytes = "vec", optional, tag = "6")]
    pub signature: Option<Vec<u8>>,
    #[prost(string, optional, tag = "7")]
    pub reasoning: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct WireResult {
    #[prost(string, tag = "1")]
    pub proposal_id: String,
    #[prost(enumeration = "WireDecision", tag = "2")]
    pub decision: i32,
    #[prost(message, repeated, tag = "3")]
    pub votes: Vec<WireVote>,
    #[prost(uint64, tag = "4")]
    pub finalized_at: u64,
    #[prost(double, tag = "5")]
    pub confidence: f64,
    #[prost(string, repeated, tag = "6")]
    pub participants: Vec<String>,
    #[prost(string, repeated, tag = "7")]
    pub abstainers: Vec<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct WireProposalBroadcast {
    #[prost(string, repeated, tag = "1")]
    pub targets: Vec<String>,
    #[prost(message, optional, tag = "2")]
    pub proposal: Option<WireProposal>,
}

#[derive(Clone, PartialEq, Message)]
pub struct WireVoteRequest {
    #[prost(uint64, tag = "1")]
    pub term: u64,
    #[prost(string, tag = "2")]
    pub candidate_id: String,
    #[prost(uint64, tag = "3")]
    pub last_log_index: u64,
    #[prost(uint64, tag = "4")]
    pub last_log_term: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct WireLogEntry {
    #[prost(uint64, tag = "1")]
    pub term: u64,
    #[prost(uint64, tag = "2")]
    pub index: u64,
    #[prost(message, optional, tag = "3")]
    pub command: Option<WireProposal>,
}

#[derive(Clone, PartialEq, Message)]
pub struct WireAppendEntries {
    #[prost(uint64, tag = "1")]
    pub term: u64,
    #[prost(string, tag = "2")]
    pub leader_id: String,
    #[prost(uint64, tag = "3")]
    pub prev_log_index: u64,
    #[prost(uint64, tag = "4")]
    pub prev_log_term: u64,
    #[prost(message, repeated, tag = "5")]
    pub entries: Vec<WireLogEntry>,
    #[prost(uint64, tag = "6")]
    pub leader_commit: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct WireByzantine {
    #[prost(enumeration = "WireByzantinePhase", tag = "1")]
    pub phase: i32,
    #[prost(message, optional, tag = "2")]
    pub proposal: Option<WireProposal>,
    #[prost(enumeration = "WireDecision", optional, tag = "3")]
    pub decision: Option<i32>,
    #[prost(uint64, tag = "4")]
    pub votes: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct WireGossip {
    #[prost(string, tag = "1")]
    pub target: String,
    #[prost(string, tag = "2")]
    pub proposal_id: String,
    #[prost(uint32, tag = "3")]
    pub round: u32,
    #[prost(uint64, tag = "4")]
    pub votes_seen: u64,
    #[prost(bool, tag = "5")]
    pub converged: bool,
    #[prost(message, optional, tag = "6")]
    pub proposal: Option<WireProposal>,
    #[prost(message, repeated, tag = "7")]
    pub votes: Vec<WireVote>,
}

#[derive(Clone, PartialEq, Message)]
pub struct WireShutdown {
    #[prost(string, repeated, tag = "1")]
    pub dropped: Vec<String>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum WireBody {
    #[prost(message, tag = "2")]
    ProposalBroadcast(WireProposalBroadcast),
    #[prost(message, tag = "3")]
    RaftVoteRequest(WireVoteRequest),
    #[prost(message, tag = "4")]
    RaftAppendEntries(WireAppendEntries),
    #[prost(message, tag = "5")]
    Byzantine(WireByzantine),
    #[prost(message, tag = "6")]
    Gossip(WireGossip),
    #[prost(message, tag = "7")]
    VoteCast(WireVote),
    #[prost(message, tag = "8")]
    ConsensusReached(WireResult),
    #[prost(message, tag = "9")]
    Shutdown(WireShutdown),
}

#[derive(Clone, PartialEq, Message)]
pub struct WireEnvelope {
    #[prost(string, tag = "1")]
    pub topic: String,
    #[prost(oneof = "WireBody", tags = "2, 3, 4, 5, 6, 7, 8, 9")]
    pub body: Option<WireBody>,
}

impl From<VoteDecision> for WireDecision {
    fn from(decision: VoteDecision) -> Self {
        match decision {
            VoteDecision::Approve => WireDecision::Approve,
            VoteDecision::Reject => WireDecision::Reject,
            VoteDecision::Abstain => WireDecision::Abstain,
        }
    }
}

impl TryFrom<WireDecision> for VoteDecision {
    type Error = ConsensusError;

    fn try_from(decision: WireDecision) -> Result<Self, Self::Error> {
        match decision {
            WireDecision::Approve => Ok(VoteDecision::Approve),
            WireDecision::Reject => Ok(VoteDecision::Reject),
            WireDecision::Abstain => Ok(VoteDecision::Abstain),
            WireDecision::Unspecified => Err(ConsensusError::InvalidWireMessage(
                "vote has no decision".to_string(),
            )),
        }
    }
}

impl From<ProposalType> for WireProposalType {
    fn from(proposal_type: ProposalType) -> Self {
        match proposal_type {
            ProposalType::TaskAssignment => WireProposalType::TaskAssignment,
            ProposalType::ResourceAllocation => WireProposalType::ResourceAllocation,
            ProposalType::ConfigurationChange => WireProposalType::ConfigurationChange,
            ProposalType::AgentElection => WireProposalType::AgentElection,
            ProposalType::WorkflowDecision => WireProposalType::WorkflowDecision,
            ProposalType::SystemUpdate => WireProposalType::SystemUpdate,
            ProposalType::EmergencyAction => WireProposalType::EmergencyAction,
        }
    }
}

impl From<ByzantinePhase> for WireByzantinePhase {
    fn from(phase: ByzantinePhase) -> Self {
        match phase {
            ByzantinePhase::Prepare => WireByzantinePhase::Prepare,
            ByzantinePhase::Prepared => WireByzantinePhase::Prepared,
            ByzantinePhase::Commit => WireByzantinePhase::Commit,
        }
    }
}

impl From<&Proposal> for WireProposal {
    fn from(proposal: &Proposal) -> Self {
        Self {
            id: proposal.id.clone(),
            proposer_id: proposal.proposer_id.clone(),
            proposal_type: WireProposalType::from(proposal.proposal_type) as i32,
            content: proposal.content.clone(),
            created_at: proposal.created_at,
            deadline: proposal.deadline,
            term: proposal.term,
            log_index: proposal.log_index,
            signature: proposal.signature.clone(),
        }
    }
}

impl From<&Vote> for WireVote {
    fn from(vote: &Vote) -> Self {
        Self {
            proposal_id: vote.proposal_id.clone(),
            voter_id: vote.voter_id.clone(),
            decision: WireDecision::from(vote.decision) as i32,
            cast_at: vote.cast_at,
            term: vote.term,
            signature: vote.signature.clone(),
            reasoning: vote.reasoning.clone(),
        }
    }
}

impl TryFrom<WireVote> for Vote {
    type Error = ConsensusError;

    fn try_from(vote: WireVote) -> Result<Self, Self::Error> {
        let decision = WireDecision::try_from(vote.decision).map_err(|_| {
            ConsensusError::InvalidWireMessage(format!("unknown decision {}", vote.decision))
        })?;
        Ok(Vote {
            proposal_id: vote.proposal_id,
            voter_id: vote.voter_id,
            decision: VoteDecision::try_from(decision)?,
            cast_at: vote.cast_at,
            term: vote.term,
            signature: vote.signature,
            reasoning: vote.reasoning,
        })
    }
}

impl From<&ConsensusResult> for WireResult {
    fn from(result: &ConsensusResult) -> Self {
        Self {
            proposal_id: result.proposal_id.clone(),
            decision: WireDecision::from(result.decision) as i32,
            votes: result.votes.iter().map(WireVote::from).collect(),
            finalized_at: result.finalized_at,
            confidence: result.confidence,
            participants: result.participants.clone(),
            abstainers: result.abstainers.clone(),
        }
    }
}

impl From<&RaftVoteRequest> for WireVoteRequest {
    fn from(request: &RaftVoteRequest) -> Self {
        Self {
            term: request.term,
            candidate_id: request.candidate_id.clone(),
            last_log_index: request.last_log_index,
            last_log_term: request.last_log_term,
        }
    }
}

impl From<&RaftLogEntry> for WireLogEntry {
    fn from(entry: &RaftLogEntry) -> Self {
        Self {
            term: entry.term,
            index: entry.index,
            command: Some(WireProposal::from(&entry.command)),
        }
    }
}

impl From<&AppendEntries> for WireAppendEntries {
    fn from(append: &AppendEntries) -> Self {
        Self {
            term: append.term,
            leader_id: append.leader_id.clone(),
            prev_log_index: append.prev_log_index,
            prev_log_term: append.prev_log_term,
            entries: append.entries.iter().map(WireLogEntry::from).collect(),
            leader_commit: append.leader_commit,
        }
    }
}

impl From<&ConsensusEvent> for WireEnvelope {
    fn from(event: &ConsensusEvent) -> Self {
        let body = match event {
            ConsensusEvent::ProposalBroadcast { targets, proposal } => {
                WireBody::ProposalBroadcast(WireProposalBroadcast {
                    targets: targets.clone(),
                    proposal: Some(proposal.into()),
                })
            }
            ConsensusEvent::RaftVoteRequest(request) => WireBody::RaftVoteRequest(request.into()),
            ConsensusEvent::RaftAppendEntries(append) => {
                WireBody::RaftAppendEntries(append.into())
            }
            ConsensusEvent::Byzantine {
                phase,
                proposal,
                decision,
                votes,
            } => WireBody::Byzantine(WireByzantine {
                phase: WireByzantinePhase::from(*phase) as i32,
                proposal: Some(proposal.into()),
                decision: decision.map(|decision| WireDecision::from(decision) as i32),
                votes: *votes as u64,
            }),
            ConsensusEvent::GossipMessage {
                target,
                proposal_id,
                state,
                proposal,
                votes,
                round,
            } => WireBody::Gossip(WireGossip {
                target: target.clone(),
                proposal_id: proposal_id.clone(),
                round: *round,
                votes_seen: state.votes_seen as u64,
                converged: state.converged,
                proposal: Some(proposal.into()),
                votes: votes.iter().map(WireVote::from).collect(),
            }),
            ConsensusEvent::VoteCast(vote) => WireBody::VoteCast(vote.into()),
            ConsensusEvent::ConsensusReached(result) => WireBody::ConsensusReached(result.into()),
            ConsensusEvent::Shutdown { dropped } => WireBody::Shutdown(WireShutdown {
                dropped: dropped.clone(),
            }),
        };
        Self {
            topic: event.topic().to_string(),
            body: Some(body),
        }
    }
}

/// Encode an event as a protobuf envelope.
pub fn encode_event(event: &ConsensusEvent) -> Vec<u8> {
    WireEnvelope::from(event).encode_to_vec()
}

pub fn decode_envelope(bytes: &[u8]) -> Result<WireEnvelope, ConsensusError> {
    Ok(WireEnvelope::decode(bytes)?)
}

/// Decode a peer's `vote_cast` envelope.
pub fn decode_vote(bytes: &[u8]) -> Result<Vote, ConsensusError> {
    match decode_envelope(bytes)?.body {
        Some(WireBody::VoteCast(vote)) => Vote::try_from(vote),
        Some(_) => Err(ConsensusError::InvalidWireMessage(
            "expected a vote_cast envelope".to_string(),
        )),
        None => Err(ConsensusError::InvalidWireMessage(
            "envelope has no body".to_string(),
        )),
    }
}
