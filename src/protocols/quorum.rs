use crate::{
    error::ConsensusError,
    events::ConsensusEvent,
    protocols::{ProtocolStrategy, broadcast_targets},
    session::{ConsensusSession, Verdict},
    types::{AgentId, ConsensusType, VoteDecision},
    utils::{confidence, majority_quorum},
};

/// Simple majority of the known membership.
#[derive(Debug, Clone)]
pub struct QuorumStrategy {
    /// Fixed quorum overriding `ceil(N/2)`.
    quorum_size: Option<usize>,
}

impl QuorumStrategy {
    pub fn new(quorum_size: Option<usize>) -> Self {
        Self { quorum_size }
    }

    pub fn quorum(&self, members: usize) -> usize {
        self.quorum_size.unwrap_or_else(|| majority_quorum(members))
    }
}

impl ProtocolStrategy for QuorumStrategy {
    fn consensus_type(&self) -> ConsensusType {
        ConsensusType::Quorum
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

    fn evaluate(&self, session: &ConsensusSession, members: usize) -> Option<Verdict> {
        if members == 0 {
            return None;
        }
        let quorum = self.quorum(members);
        let tally = session.tally();
        if tally.approve >= quorum {
            Some(Verdict {
                decision: VoteDecision::Approve,
                confidence: confidence(tally.approve, members),
            })
        } else if tally.reject >= quorum {
            Some(Verdict {
                decision: VoteDecision::Reject,
                confidence: confidence(tally.reject, members),
            })
        } else {
            None
        }
    }
}
