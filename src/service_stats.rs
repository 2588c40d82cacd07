use std::time::Duration;

use crate::{
    events::ConsensusEventBus,
    service::ConsensusService,
    storage::ConsensusStorage,
    types::{ConsensusResult, VoteDecision},
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsensusStats {
    /// Proposals registered by this engine.
    pub proposals_submitted: u64,
    /// Proposals finalized as Approve.
    pub proposals_accepted: u64,
    /// Proposals finalized as Reject, including expired ones.
    pub proposals_rejected: u64,
    /// Proposals that hit their deadline without agreement.
    pub proposals_expired: u64,
    pub votes_cast: u64,
    /// Votes refused by the validator.
    pub votes_rejected: u64,
    /// Proposals still accepting votes.
    pub active_proposals: usize,
    /// Mean time from creation to finalization.
    pub average_consensus_time: Duration,
}

/// Running counters behind [`ConsensusStats`].
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    stats: ConsensusStats,
    finalized: u64,
    total_consensus_millis: u64,
}

impl StatsRecorder {
    pub(crate) fn proposal_submitted(&mut self) {
        self.stats.proposals_submitted += 1;
    }

    pub(crate) fn vote_cast(&mut self) {
        self.stats.votes_cast += 1;
    }

    pub(crate) fn vote_rejected(&mut self) {
        self.stats.votes_rejected += 1;
    }

    pub(crate) fn finalized(&mut self, result: &ConsensusResult, created_at: u64, timed_out: bool) {
        match result.decision {
            VoteDecision::Approve => self.stats.proposals_accepted += 1,
            _ => self.stats.proposals_rejected += 1,
        }
        if timed_out {
            self.stats.proposals_expired += 1;
        }
        self.finalized += 1;
        self.total_consensus_millis += result.finalized_at.saturating_sub(created_at);
        self.stats.average_consensus_time =
            Duration::from_millis(self.total_consensus_millis / self.finalized);
    }

    pub(crate) fn snapshot(&self) -> ConsensusStats {
        self.stats.clone()
    }
}

impl<S, E> ConsensusService<S, E>
where
    S: ConsensusStorage,
    E: ConsensusEventBus,
{
    /// Counters since the engine was built, plus the current number of active proposals.
    pub async fn get_stats(&self) -> ConsensusStats {
        let mut stats = self.stats.lock().snapshot();
        stats.active_proposals = self.storage.active_count().await.unwrap_or_default();
        stats
    }
}
