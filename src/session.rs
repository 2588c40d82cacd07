use std::collections::HashSet;

use crate::{
    error::{ConsensusError, VoteRejection},
    types::{AgentId, ConsensusResult, Proposal, Vote, VoteDecision},
};

/// Per-proposal gossip progress. Frozen once `converged` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GossipRoundState {
    /// Votes collected when the last round was sent.
    pub votes_seen: usize,
    pub round: u32,
    pub converged: bool,
}

/// Outcome a protocol strategy reached for a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub decision: VoteDecision,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoteTally {
    pub approve: usize,
    pub reject: usize,
    pub abstain: usize,
}

impl VoteTally {
    pub fn total(&self) -> usize {
        self.approve + self.reject + self.abstain
    }
}

/// An in-flight proposal together with its live vote set.
#[derive(Debug, Clone)]
pub struct ConsensusSession {
    pub proposal: Proposal,
    /// Live votes in admission order, at most one per voter.
    pub votes: Vec<Vote>,
    /// Present only under the gossip protocol.
    pub gossip: Option<GossipRoundState>,
}

impl ConsensusSession {
    pub fn new(proposal: Proposal) -> Self {
        Self {
            proposal,
            votes: Vec::new(),
            gossip: None,
        }
    }

    /// Admit a vote, replacing any earlier vote from the same voter.
    ///
    /// Returns the vote it replaced, if any. The replacing vote moves to the end of
    /// the admission order.
    pub(crate) fn add_vote(&mut self, vote: Vote) -> Result<Option<Vote>, ConsensusError> {
        if vote.proposal_id != self.proposal.id {
            return Err(VoteRejection::ProposalMismatch.into());
        }
        let previous = self
            .votes
            .iter()
            .position(|existing| existing.voter_id == vote.voter_id)
            .map(|idx| self.votes.remove(idx));
        self.votes.push(vote);
        Ok(previous)
    }

    pub fn tally(&self) -> VoteTally {
        self.votes
            .iter()
            .fold(VoteTally::default(), |mut tally, vote| {
                match vote.decision {
                    VoteDecision::Approve => tally.approve += 1,
                    VoteDecision::Reject => tally.reject += 1,
                    VoteDecision::Abstain => tally.abstain += 1,
                }
                tally
            })
    }

    /// Build the final result for `verdict` against the given membership.
    pub(crate) fn to_result(
        &self,
        verdict: Verdict,
        members: &[AgentId],
        now: u64,
    ) -> ConsensusResult {
        let participants: Vec<AgentId> =
            self.votes.iter().map(|vote| vote.voter_id.clone()).collect();

        let active: HashSet<&str> = self
            .votes
            .iter()
            .filter(|vote| vote.decision != VoteDecision::Abstain)
            .map(|vote| vote.voter_id.as_str())
            .collect();
        let mut abstainers: Vec<AgentId> = members
            .iter()
            .filter(|member| !active.contains(member.as_str()))
            .cloned()
            .collect();
        for vote in &self.votes {
            if vote.decision == VoteDecision::Abstain && !abstainers.contains(&vote.voter_id) {
                abstainers.push(vote.voter_id.clone());
            }
        }

        ConsensusResult {
            proposal_id: self.proposal.id.clone(),
            decision: verdict.decision,
            votes: self.votes.clone(),
            finalized_at: now.max(self.proposal.created_at),
            confidence: verdict.confidence,
            participants,
            abstainers,
        }
    }

    /// Result recorded when the deadline passes without agreement.
    pub(crate) fn to_timeout_result(&self, members: &[AgentId], now: u64) -> ConsensusResult {
        self.to_result(
            Verdict {
                decision: VoteDecision::Reject,
                confidence: 0.0,
            },
            members,
            now,
        )
    }
}
