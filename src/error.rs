use crate::types::AgentId;

/// Why a vote was refused by the validator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VoteRejection {
    #[error("signature does not match vote digest")]
    InvalidSignature,
    #[error("signature required but missing")]
    MissingSignature,
    #[error("stale term: vote carries {vote_term:?}, current term is {current_term}")]
    StaleTerm {
        vote_term: Option<u64>,
        current_term: u64,
    },
    #[error("voter {0} is not a known member")]
    UnknownVoter(AgentId),
    #[error("vote belongs to a different proposal")]
    ProposalMismatch,
}

#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    #[error("Protocol misconfigured: {0}")]
    ProtocolMisconfigured(String),
    #[error("Invalid timeout: must be greater than zero")]
    InvalidTimeout,
    #[error("Too many active proposals (limit {0})")]
    ProposalLimitReached(usize),

    #[error("Proposal not found")]
    ProposalNotFound,
    #[error("Proposal expired")]
    ProposalExpired,
    #[error("Invalid vote: {0}")]
    InvalidVote(#[from] VoteRejection),

    #[error("Not the leader (known leader: {leader:?})")]
    NotLeader { leader: Option<AgentId> },
    #[error("Protocol operation not supported: {0}")]
    ProtocolUnsupported(&'static str),

    #[error("Consensus engine shut down")]
    EngineShutdown,

    #[error("Invalid wire message: {0}")]
    InvalidWireMessage(String),
    #[error("Failed to decode wire message: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Failed to get current time")]
    FailedToGetCurrentTime(#[from] std::time::SystemTimeError),
}
