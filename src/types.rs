use std::{fmt, time::Duration};

use crate::{
    error::ConsensusError,
    utils::{compute_proposal_digest, current_timestamp, generate_proposal_id, validate_timeout},
};

/// Identifier of an agent taking part in consensus.
pub type AgentId = String;
/// Identifier of a proposal (a UUID v4 string).
pub type ProposalId = String;

/// The kind of decision a proposal asks the agents to make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProposalType {
    TaskAssignment,
    ResourceAllocation,
    ConfigurationChange,
    AgentElection,
    WorkflowDecision,
    SystemUpdate,
    EmergencyAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoteDecision {
    Approve,
    Reject,
    Abstain,
}

impl VoteDecision {
    pub(crate) fn as_byte(self) -> u8 {
        match self {
            VoteDecision::Approve => 1,
            VoteDecision::Reject => 2,
            VoteDecision::Abstain => 3,
        }
    }
}

/// Agreement protocol the engine runs. Selected once, at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsensusType {
    /// Simple majority of known members: `ceil(N/2)`.
    Quorum,
    /// Leader-driven, term-checked agreement.
    Raft,
    /// `2f+1` agreeing votes with `f = floor((N-1)/3)`.
    Byzantine,
    /// Random fan-out rounds followed by a vote-fraction check.
    Gossip,
    /// Prepare/accept hooks only; proposals resolve by expiry.
    Paxos,
}

impl fmt::Display for ConsensusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConsensusType::Quorum => "quorum",
            ConsensusType::Raft => "raft",
            ConsensusType::Byzantine => "byzantine",
            ConsensusType::Gossip => "gossip",
            ConsensusType::Paxos => "paxos",
        };
        f.write_str(name)
    }
}

/// A unit of decision submitted for agreement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub id: ProposalId,
    pub proposer_id: AgentId,
    pub proposal_type: ProposalType,
    /// Opaque payload; never interpreted by the engine.
    pub content: Vec<u8>,
    /// Milliseconds since Unix epoch.
    pub created_at: u64,
    /// Milliseconds since Unix epoch after which votes are refused.
    pub deadline: u64,
    /// Raft term the proposal was distributed in.
    pub term: Option<u64>,
    /// Raft log position, when the proposal was replicated through the log.
    pub log_index: Option<u64>,
    /// Digest over `(id, proposer_id, created_at)`; does not cover `content`.
    pub signature: Option<Vec<u8>>,
}

impl Proposal {
    pub fn is_expired_at(&self, now: u64) -> bool {
        now > self.deadline
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    pub proposal_id: ProposalId,
    pub voter_id: AgentId,
    pub decision: VoteDecision,
    pub cast_at: u64,
    pub term: Option<u64>,
    pub signature: Option<Vec<u8>>,
    pub reasoning: Option<String>,
}

/// The single, immutable outcome of a proposal.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusResult {
    pub proposal_id: ProposalId,
    pub decision: VoteDecision,
    pub votes: Vec<Vote>,
    pub finalized_at: u64,
    /// Fraction of known members backing the decision, `0.0..=1.0`.
    pub confidence: f64,
    /// Agents that cast a vote.
    pub participants: Vec<AgentId>,
    /// Known members that stayed silent or abstained.
    pub abstainers: Vec<AgentId>,
}

#[derive(Debug, Clone)]
pub struct CreateProposalRequest {
    pub proposal_type: ProposalType,
    pub content: Vec<u8>,
    /// How long votes are accepted. `None` uses the engine's `vote_timeout`.
    pub timeout: Option<Duration>,
}

impl CreateProposalRequest {
    /// Create a new proposal request with validation.
    pub fn new(
        proposal_type: ProposalType,
        content: Vec<u8>,
        timeout: Duration,
    ) -> Result<Self, ConsensusError> {
        validate_timeout(timeout)?;
        Ok(Self {
            proposal_type,
            content,
            timeout: Some(timeout),
        })
    }

    /// Request that falls back to the engine's configured vote timeout.
    pub fn with_default_timeout(proposal_type: ProposalType, content: Vec<u8>) -> Self {
        Self {
            proposal_type,
            content,
            timeout: None,
        }
    }

    /// Turn this request into a proposal owned by `proposer_id`.
    ///
    /// Generates a random proposal id, stamps the creation time and deadline, and
    /// attaches the creation digest when `sign` is set.
    pub fn into_proposal(
        self,
        proposer_id: AgentId,
        default_timeout: Duration,
        sign: bool,
    ) -> Result<Proposal, ConsensusError> {
        let timeout = self.timeout.unwrap_or(default_timeout);
        validate_timeout(timeout)?;

        let now = current_timestamp()?;
        let mut proposal = Proposal {
            id: generate_proposal_id(),
            proposer_id,
            proposal_type: self.proposal_type,
            content: self.content,
            created_at: now,
            deadline: now.saturating_add(timeout.as_millis() as u64),
            term: None,
            log_index: None,
            signature: None,
        };
        if sign {
            proposal.signature = Some(compute_proposal_digest(&proposal));
        }
        Ok(proposal)
    }
}
