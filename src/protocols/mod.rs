//! Agreement protocols.
//!
//! Each protocol is one [`ProtocolStrategy`]: how a new proposal is pushed out,
//! which votes are admissible, and when the collected votes amount to a decision.
//! The engine picks exactly one strategy at construction.

mod byzantine;
mod gossip;
mod paxos;
mod quorum;
mod raft;

pub use byzantine::ByzantineStrategy;
pub use gossip::GossipStrategy;
pub use paxos::PaxosStrategy;
pub use quorum::QuorumStrategy;
pub use raft::RaftStrategy;

use std::{fmt::Debug, sync::Arc};

use crate::{
    config::ConsensusConfig,
    error::{ConsensusError, VoteRejection},
    events::ConsensusEvent,
    membership::MembershipRegistry,
    raft::RaftNode,
    session::{ConsensusSession, Verdict},
    types::{AgentId, ConsensusResult, ConsensusType, Vote},
};

pub trait ProtocolStrategy: Send + Sync + Debug {
    fn consensus_type(&self) -> ConsensusType;

    /// Prepare a freshly created session and return the messages that announce it.
    ///
    /// Runs before the session is registered; an error leaves no trace.
    fn distribute(
        &self,
        session: &mut ConsensusSession,
        members: &[AgentId],
    ) -> Result<Vec<ConsensusEvent>, ConsensusError>;

    /// Protocol-specific admission checks, after the signature check.
    fn validate_vote(
        &self,
        _vote: &Vote,
        _membership: &MembershipRegistry,
    ) -> Result<(), VoteRejection> {
        Ok(())
    }

    /// Whether the session's votes decide it, given `members` known agents.
    fn evaluate(&self, session: &ConsensusSession, members: usize) -> Option<Verdict>;

    /// Periodic step for protocols that advance without votes.
    fn tick(&self, _session: &mut ConsensusSession, _members: &[AgentId]) -> Vec<ConsensusEvent> {
        Vec::new()
    }

    /// Messages and bookkeeping after a session is finalized.
    fn on_finalized(
        &self,
        _session: &ConsensusSession,
        _result: &ConsensusResult,
        _timed_out: bool,
    ) -> Vec<ConsensusEvent> {
        Vec::new()
    }
}

/// Every member except `exclude`.
pub(crate) fn broadcast_targets(members: &[AgentId], exclude: &str) -> Vec<AgentId> {
    members
        .iter()
        .filter(|member| member.as_str() != exclude)
        .cloned()
        .collect()
}

/// Build the strategy for a validated config.
pub(crate) fn build_strategy(
    config: &ConsensusConfig,
    raft: Option<Arc<RaftNode>>,
) -> Result<Arc<dyn ProtocolStrategy>, ConsensusError> {
    let strategy: Arc<dyn ProtocolStrategy> = match config.consensus_type {
        ConsensusType::Quorum => Arc::new(QuorumStrategy::new(config.quorum_size)),
        ConsensusType::Byzantine => Arc::new(ByzantineStrategy::new(config.byzantine_tolerance)),
        ConsensusType::Paxos => Arc::new(PaxosStrategy::new()),
        ConsensusType::Raft => {
            let node = raft.ok_or_else(|| {
                ConsensusError::ProtocolMisconfigured("raft protocol requires a raft node".into())
            })?;
            Arc::new(RaftStrategy::new(node))
        }
        ConsensusType::Gossip => {
            let gossip = config.gossip.clone().ok_or_else(|| {
                ConsensusError::ProtocolMisconfigured(
                    "gossip protocol requires gossip config".into(),
                )
            })?;
            Arc::new(GossipStrategy::new(config.agent_id.clone(), gossip))
        }
    };
    Ok(strategy)
}
