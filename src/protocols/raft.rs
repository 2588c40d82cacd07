use std::sync::Arc;

use crate::{
    error::{ConsensusError, VoteRejection},
    events::ConsensusEvent,
    membership::MembershipRegistry,
    protocols::{ProtocolStrategy, broadcast_targets},
    raft::RaftNode,
    session::{ConsensusSession, Verdict},
    types::{AgentId, ConsensusResult, ConsensusType, Vote, VoteDecision},
    utils::{confidence, majority_quorum},
};

/// Leader-driven agreement. Only the leader distributes and decides.
#[derive(Debug, Clone)]
pub struct RaftStrategy {
    node: Arc<RaftNode>,
}

impl RaftStrategy {
    pub fn new(node: Arc<RaftNode>) -> Self {
        Self { node }
    }
}

impl ProtocolStrategy for RaftStrategy {
    fn consensus_type(&self) -> ConsensusType {
        ConsensusType::Raft
    }

    fn distribute(
        &self,
        session: &mut ConsensusSession,
        members: &[AgentId],
    ) -> Result<Vec<ConsensusEvent>, ConsensusError> {
        if self.node.config().log_replication {
            let append = self.node.append_proposal(&mut session.proposal)?;
            return Ok(vec![ConsensusEvent::RaftAppendEntries(append)]);
        }

        let term = self.node.require_leader()?;
        session.proposal.term = Some(term);
        Ok(vec![ConsensusEvent::ProposalBroadcast {
            targets: broadcast_targets(members, &session.proposal.proposer_id),
            proposal: session.proposal.clone(),
        }])
    }

    fn validate_vote(
        &self,
        vote: &Vote,
        _membership: &MembershipRegistry,
    ) -> Result<(), VoteRejection> {
        let current_term = self.node.current_term();
        if vote.term != Some(current_term) {
            return Err(VoteRejection::StaleTerm {
                vote_term: vote.term,
                current_term,
            });
        }
        Ok(())
    }

    fn evaluate(&self, session: &ConsensusSession, members: usize) -> Option<Verdict> {
        if members == 0 || !self.node.is_leader() {
            return None;
        }
        let acks = session.tally().approve;
        (acks >= majority_quorum(members)).then(|| Verdict {
            decision: VoteDecision::Approve,
            confidence: confidence(acks, members),
        })
    }

    fn on_finalized(
        &self,
        session: &ConsensusSession,
        result: &ConsensusResult,
        timed_out: bool,
    ) -> Vec<ConsensusEvent> {
        if !timed_out && result.decision == VoteDecision::Approve {
            if let Some(index) = session.proposal.log_index {
                self.node.commit(index);
            }
        }
        Vec::new()
    }
}
