use rand::seq::SliceRandom;

use crate::{
    config::GossipConfig,
    error::ConsensusError,
    events::ConsensusEvent,
    protocols::{ProtocolStrategy, broadcast_targets},
    session::{ConsensusSession, GossipRoundState, Verdict},
    types::{AgentId, ConsensusType, VoteDecision},
    utils::{confidence, gossip_required_votes},
};

/// Random fan-out for `max_rounds`, then a vote-fraction check.
#[derive(Debug, Clone)]
pub struct GossipStrategy {
    agent_id: AgentId,
    config: GossipConfig,
}

impl GossipStrategy {
    pub fn new(agent_id: AgentId, config: GossipConfig) -> Self {
        Self { agent_id, config }
    }
}

impl ProtocolStrategy for GossipStrategy {
    fn consensus_type(&self) -> ConsensusType {
        ConsensusType::Gossip
    }

    fn distribute(
        &self,
        session: &mut ConsensusSession,
        _members: &[AgentId],
    ) -> Result<Vec<ConsensusEvent>, ConsensusError> {
        session.gossip = Some(GossipRoundState::default());
        Ok(Vec::new())
    }

    fn evaluate(&self, session: &ConsensusSession, members: usize) -> Option<Verdict> {
        if members == 0 || !session.gossip.as_ref().is_some_and(|state| state.converged) {
            return None;
        }
        let tally = session.tally();
        let collected = tally.total();
        if collected < gossip_required_votes(members, self.config.convergence_threshold) {
            return None;
        }
        let decision = if tally.approve * 2 > collected {
            VoteDecision::Approve
        } else {
            VoteDecision::Reject
        };
        Some(Verdict {
            decision,
            confidence: confidence(collected, members),
        })
    }

    /// Send one round to `fanout` random peers and advance the round counter.
    fn tick(&self, session: &mut ConsensusSession, members: &[AgentId]) -> Vec<ConsensusEvent> {
        let votes_seen = session.votes.len();
        let Some(state) = session.gossip.as_mut() else {
            return Vec::new();
        };
        if state.converged {
            return Vec::new();
        }
        state.round += 1;
        state.votes_seen = votes_seen;
        if state.round >= self.config.max_rounds {
            state.converged = true;
        }
        let state = state.clone();

        let peers = broadcast_targets(members, &self.agent_id);
        let targets: Vec<AgentId> = peers
            .choose_multiple(&mut rand::thread_rng(), self.config.fanout)
            .cloned()
            .collect();
        targets
            .into_iter()
            .map(|target| ConsensusEvent::GossipMessage {
                target,
                proposal_id: session.proposal.id.clone(),
                state: state.clone(),
                proposal: session.proposal.clone(),
                votes: session.votes.clone(),
                round: state.round,
            })
            .collect()
    }
}
