use crate::{
    error::ConsensusError,
    events::ConsensusEvent,
    protocols::{ProtocolStrategy, broadcast_targets},
    session::{ConsensusSession, Verdict},
    types::{AgentId, ConsensusType},
};

/// Paxos placeholder: proposals are broadcast but never decided by votes, so
/// they resolve only through expiry.
#[derive(Debug, Clone, Default)]
pub struct PaxosStrategy;

impl PaxosStrategy {
    pub fn new() -> Self {
        Self
    }

    /// Phase-1 hook. No ballot handling exists yet.
    pub fn handle_prepare(&self, _proposal_id: &str, _ballot: u64) -> Result<(), ConsensusError> {
        Err(ConsensusError::ProtocolUnsupported("paxos prepare"))
    }

    /// Phase-2 hook. No ballot handling exists yet.
    pub fn handle_accept(&self, _proposal_id: &str, _ballot: u64) -> Result<(), ConsensusError> {
        Err(ConsensusError::ProtocolUnsupported("paxos accept"))
    }
}

impl ProtocolStrategy for PaxosStrategy {
    fn consensus_type(&self) -> ConsensusType {
        ConsensusType::Paxos
    }

    fn distribute(
        &self,
        session: &mut ConsensusSession,
        members: &[AgentId],
    ) -> Result<Vec<ConsensusEvent>, ConsensusError> {
        Ok(vec![ConsensusEvent::ProposalBroadcast {
            targets: broadcast_targets(members, &session.proposal.proposer_id),
            proposal: session.proposal.clone(),
        }])
    }

    fn evaluate(&self, _session: &ConsensusSession, _members: usize) -> Option<Verdict> {
        None
    }
}
