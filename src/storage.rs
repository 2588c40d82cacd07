use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

use crate::{
    error::ConsensusError,
    session::ConsensusSession,
    types::{ConsensusResult, ProposalId},
};

/// Holds in-flight sessions and the table of finalized results.
///
/// Every mutation runs as a closure under the store's exclusive guard, so a
/// session is never observed half-updated and finalization (result written,
/// session removed) is a single step.
#[async_trait::async_trait]
pub trait ConsensusStorage: Send + Sync + 'static {
    /// Register a new session, refusing it when `max_active` sessions already exist.
    ///
    /// `prepare` runs on the session after the limit check and before it is
    /// stored, all under one guard. If either fails, nothing is stored and
    /// `prepare` may not have run.
    async fn insert_session<R, F>(
        &self,
        session: ConsensusSession,
        max_active: usize,
        prepare: F,
    ) -> Result<R, ConsensusError>
    where
        R: Send,
        F: FnOnce(&mut ConsensusSession) -> Result<R, ConsensusError> + Send;

    async fn get_session(
        &self,
        proposal_id: &str,
    ) -> Result<Option<ConsensusSession>, ConsensusError>;

    /// Apply `mutator` to an active session.
    async fn update_session<R, F>(&self, proposal_id: &str, mutator: F) -> Result<R, ConsensusError>
    where
        R: Send,
        F: FnOnce(&mut ConsensusSession) -> Result<R, ConsensusError> + Send;

    /// Finalize an active session if `settle` produces a result for it.
    ///
    /// Returns the removed session with its result, or `None` when the session is
    /// unknown (already finalized or never registered) or `settle` declines.
    async fn finalize_with<F>(
        &self,
        proposal_id: &str,
        settle: F,
    ) -> Result<Option<(ConsensusSession, ConsensusResult)>, ConsensusError>
    where
        F: FnOnce(&ConsensusSession) -> Option<ConsensusResult> + Send;

    async fn list_active_sessions(&self) -> Result<Vec<ConsensusSession>, ConsensusError>;

    async fn active_count(&self) -> Result<usize, ConsensusError>;

    async fn get_result(&self, proposal_id: &str)
    -> Result<Option<ConsensusResult>, ConsensusError>;

    /// Drop the oldest results until at most `retain` remain.
    async fn trim_results(&self, retain: usize) -> Result<usize, ConsensusError>;

    /// Drop every active session, returning their ids.
    async fn clear_active(&self) -> Result<Vec<ProposalId>, ConsensusError>;
}

#[derive(Default)]
struct StoreState {
    active: HashMap<ProposalId, ConsensusSession>,
    results: HashMap<ProposalId, ConsensusResult>,
    /// Finalization order, oldest first.
    result_order: VecDeque<ProposalId>,
}

/// In-memory implementation of [`ConsensusStorage`].
#[derive(Default)]
pub struct InMemoryConsensusStorage {
    state: RwLock<StoreState>,
}

impl InMemoryConsensusStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ConsensusStorage for InMemoryConsensusStorage {
    async fn insert_session<R, F>(
        &self,
        mut session: ConsensusSession,
        max_active: usize,
        prepare: F,
    ) -> Result<R, ConsensusError>
    where
        R: Send,
        F: FnOnce(&mut ConsensusSession) -> Result<R, ConsensusError> + Send,
    {
        let mut state = self.state.write().await;
        if state.active.len() >= max_active {
            return Err(ConsensusError::ProposalLimitReached(max_active));
        }
        let prepared = prepare(&mut session)?;
        state.active.insert(session.proposal.id.clone(), session);
        Ok(prepared)
    }

    async fn get_session(
        &self,
        proposal_id: &str,
    ) -> Result<Option<ConsensusSession>, ConsensusError> {
        let state = self.state.read().await;
        Ok(state.active.get(proposal_id).cloned())
    }

    async fn update_session<R, F>(&self, proposal_id: &str, mutator: F) -> Result<R, ConsensusError>
    where
        R: Send,
        F: FnOnce(&mut ConsensusSession) -> Result<R, ConsensusError> + Send,
    {
        let mut state = self.state.write().await;
        let session = state
            .active
            .get_mut(proposal_id)
            .ok_or(ConsensusError::ProposalNotFound)?;
        mutator(session)
    }

    async fn finalize_with<F>(
        &self,
        proposal_id: &str,
        settle: F,
    ) -> Result<Option<(ConsensusSession, ConsensusResult)>, ConsensusError>
    where
        F: FnOnce(&ConsensusSession) -> Option<ConsensusResult> + Send,
    {
        let mut state = self.state.write().await;
        let Some(result) = state.active.get(proposal_id).and_then(settle) else {
            return Ok(None);
        };
        let Some(session) = state.active.remove(proposal_id) else {
            return Ok(None);
        };
        state.result_order.push_back(result.proposal_id.clone());
        state
            .results
            .insert(result.proposal_id.clone(), result.clone());
        Ok(Some((session, result)))
    }

    async fn list_active_sessions(&self) -> Result<Vec<ConsensusSession>, ConsensusError> {
        let state = self.state.read().await;
        Ok(state.active.values().cloned().collect())
    }

    async fn active_count(&self) -> Result<usize, ConsensusError> {
        Ok(self.state.read().await.active.len())
    }

    async fn get_result(
        &self,
        proposal_id: &str,
    ) -> Result<Option<ConsensusResult>, ConsensusError> {
        let state = self.state.read().await;
        Ok(state.results.get(proposal_id).cloned())
    }

    async fn trim_results(&self, retain: usize) -> Result<usize, ConsensusError> {
        let mut state = self.state.write().await;
        let mut evicted = 0;
        while state.result_order.len() > retain {
            if let Some(oldest) = state.result_order.pop_front() {
                state.results.remove(&oldest);
                evicted += 1;
            }
        }
        Ok(evicted)
    }

    async fn clear_active(&self) -> Result<Vec<ProposalId>, ConsensusError> {
        let mut state = self.state.write().await;
        Ok(state.active.drain().map(|(id, _)| id).collect())
    }
}
