use crate::{
    error::{ConsensusError, VoteRejection},
    events::{ByzantinePhase, ConsensusEvent},
    membership::MembershipRegistry,
    protocols::{ProtocolStrategy, broadcast_targets},
    session::{ConsensusSession, Verdict},
    types::{AgentId, ConsensusResult, ConsensusType, Vote, VoteDecision},
    utils::{byzantine_fault_tolerance, byzantine_required_votes, confidence},
};

/// `2f+1` agreement, announced as prepare → prepared → commit.
#[derive(Debug, Clone)]
pub struct ByzantineStrategy {
    /// Minimum `f`; raises but never lowers `floor((N-1)/3)`.
    tolerance: Option<usize>,
}

impl ByzantineStrategy {
    pub fn new(tolerance: Option<usize>) -> Self {
        Self { tolerance }
    }

    pub fn required_votes(&self, members: usize) -> usize {
        let faulty = byzantine_fault_tolerance(members).max(self.tolerance.unwrap_or(0));
        byzantine_required_votes(faulty)
    }
}

impl ProtocolStrategy for ByzantineStrategy {
    fn consensus_type(&self) -> ConsensusType {
        ConsensusType::Byzantine
    }

    fn distribute(
        &self,
        session: &mut ConsensusSession,
        members: &[AgentId],
    ) -> Result<Vec<ConsensusEvent>, ConsensusError> {
        Ok(vec![
            ConsensusEvent::ProposalBroadcast {
                targets: broadcast_targets(members, &session.proposal.proposer_id),
                proposal: session.proposal.clone(),
            },
            ConsensusEvent::Byzantine {
                phase: ByzantinePhase::Prepare,
                proposal: session.proposal.clone(),
                decision: None,
                votes: 0,
            },
        ])
    }

    fn validate_vote(
        &self,
        vote: &Vote,
        membership: &MembershipRegistry,
    ) -> Result<(), VoteRejection> {
        if !membership.contains(&vote.voter_id) {
            return Err(VoteRejection::UnknownVoter(vote.voter_id.clone()));
        }
        Ok(())
    }

    fn evaluate(&self, session: &ConsensusSession, members: usize) -> Option<Verdict> {
        if members == 0 {
            return None;
        }
        let required = self.required_votes(members);
        let tally = session.tally();
        if tally.approve >= required {
            Some(Verdict {
                decision: VoteDecision::Approve,
                confidence: confidence(tally.approve, members),
            })
        } else if tally.reject >= required {
            Some(Verdict {
                decision: VoteDecision::Reject,
                confidence: confidence(tally.reject, members),
            })
        } else {
            None
        }
    }

    fn on_finalized(
        &self,
        session: &ConsensusSession,
        result: &ConsensusResult,
        timed_out: bool,
    ) -> Vec<ConsensusEvent> {
        if timed_out {
            return Vec::new();
        }
        let tally = session.tally();
        let votes = match result.decision {
            VoteDecision::Approve => tally.approve,
            _ => tally.reject,
        };
        [ByzantinePhase::Prepared, ByzantinePhase::Commit]
            .into_iter()
            .map(|phase| ConsensusEvent::Byzantine {
                phase,
                proposal: session.proposal.clone(),
                decision: Some(result.decision),
                votes,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::test_support::{cast, session};

    #[test]
    fn ten_members_need_seven() {
        let strategy = ByzantineStrategy::new(None);
        assert_eq!(strategy.required_votes(10), 7);
        assert_eq!(strategy.required_votes(4), 3);
        assert_eq!(strategy.required_votes(1), 1);

        let mut session = session();
        cast(&mut session, 6, VoteDecision::Approve, "yes");
        assert!(strategy.evaluate(&session, 10).is_none());

        cast(&mut session, 7, VoteDecision::Approve, "yes");
        let verdict = strategy.evaluate(&session, 10).expect("decided");
        assert_eq!(verdict.decision, VoteDecision::Approve);
        assert!((verdict.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn tolerance_only_raises_threshold() {
        assert_eq!(ByzantineStrategy::new(Some(1)).required_votes(10), 7);
        assert_eq!(ByzantineStrategy::new(Some(4)).required_votes(10), 9);
    }

    #[test]
    fn unknown_voters_are_refused() {
        let strategy = ByzantineStrategy::new(None);
        let membership = MembershipRegistry::new();
        membership.add_members(["a"]);
        let session = session();
        let vote = |voter: &str| Vote {
            proposal_id: session.proposal.id.clone(),
            voter_id: voter.to_string(),
            decision: VoteDecision::Approve,
            cast_at: 0,
            term: None,
            signature: None,
            reasoning: None,
        };
        assert!(strategy.validate_vote(&vote("a"), &membership).is_ok());
        assert_eq!(
            strategy.validate_vote(&vote("mallory"), &membership),
            Err(VoteRejection::UnknownVoter("mallory".into()))
        );
    }
}
