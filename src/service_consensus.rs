//! Implementation of [`ConsensusServiceAPI`] for [`ConsensusService`].

use std::{sync::Arc, time::Duration};

use tokio::time::timeout;
use tracing::info;

use crate::{
    api::ConsensusServiceAPI,
    error::ConsensusError,
    events::ConsensusEventBus,
    service::ConsensusService,
    session::ConsensusSession,
    storage::ConsensusStorage,
    types::{ConsensusResult, CreateProposalRequest, Proposal, Vote, VoteDecision},
    utils::{compute_vote_digest, current_timestamp},
    wire::decode_vote,
};

impl<S, E> ConsensusServiceAPI<S, E> for ConsensusService<S, E>
where
    S: ConsensusStorage,
    E: ConsensusEventBus,
{
    /// Register a new proposal from this agent and distribute it to the members.
    ///
    /// The proposal accepts votes until its deadline. Under raft only the leader
    /// may create proposals; followers get [`ConsensusError::NotLeader`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::{sync::Arc, time::Duration};
    /// use agent_consensus::{api::ConsensusServiceAPI, config::ConsensusConfig,
    /// service::DefaultConsensusService, types::{CreateProposalRequest, ProposalType}};
    ///
    /// async fn example() -> Result<(), Box<dyn std::error::Error>> {
    ///     let config = ConsensusConfig::builder("agent-1").build()?;
    ///     let service = DefaultConsensusService::new(config)?;
    ///     service.add_members(["agent-1", "agent-2", "agent-3"]);
    ///
    ///     let request = CreateProposalRequest::new(
    ///         ProposalType::TaskAssignment,
    ///         b"deploy".to_vec(),
    ///         Duration::from_secs(30),
    ///     )?;
    ///     let proposal = service.create_proposal(request).await?;
    ///     Ok(())
    /// }
    /// ```
    async fn create_proposal(
        &self,
        request: CreateProposalRequest,
    ) -> Result<Proposal, ConsensusError> {
        if self.is_shut_down() {
            return Err(ConsensusError::EngineShutdown);
        }
        let proposal = request.into_proposal(
            self.config.agent_id.clone(),
            self.config.vote_timeout,
            self.config.require_signatures,
        )?;

        let members = self.members();
        let strategy = Arc::clone(&self.strategy);
        let (proposal, events) = self
            .storage
            .insert_session(
                ConsensusSession::new(proposal),
                self.config.max_proposals,
                |session| {
                    let events = strategy.distribute(session, &members)?;
                    Ok((session.proposal.clone(), events))
                },
            )
            .await?;
        self.stats.lock().proposal_submitted();

        info!(
            "Agent {} created {:?} proposal {} ({} protocol, {} members)",
            self.config.agent_id,
            proposal.proposal_type,
            proposal.id,
            self.strategy.consensus_type(),
            members.len()
        );
        for event in events {
            self.emit_event(event);
        }
        Ok(proposal)
    }

    /// Wait until the proposal is finalized, by votes or by its deadline.
    ///
    /// Returns the recorded result straight away if the proposal already finished.
    async fn wait_for_result(&self, proposal_id: &str) -> Result<ConsensusResult, ConsensusError> {
        let receiver = self.register_waiter(proposal_id);

        if let Some(result) = self.storage.get_result(proposal_id).await? {
            self.drop_waiters(proposal_id);
            return Ok(result);
        }
        let Some(session) = self.storage.get_session(proposal_id).await? else {
            self.drop_waiters(proposal_id);
            return self.settled_result(proposal_id).await;
        };

        let remaining = session
            .proposal
            .deadline
            .saturating_sub(current_timestamp()?);
        match timeout(Duration::from_millis(remaining), receiver).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => self.settled_result(proposal_id).await,
            Err(_) => match self.expire_proposal(proposal_id).await? {
                Some(result) => Ok(result),
                None => self.settled_result(proposal_id).await,
            },
        }
    }

    /// Create a proposal and wait for its result.
    async fn submit(
        &self,
        request: CreateProposalRequest,
    ) -> Result<ConsensusResult, ConsensusError> {
        let proposal = self.create_proposal(request).await?;
        self.wait_for_result(&proposal.id).await
    }

    /// Cast a vote on behalf of `voter_id`.
    ///
    /// The vote carries the proposal's term and, when signatures are required, the
    /// vote digest. A voter that votes again replaces its earlier vote.
    async fn cast_vote(
        &self,
        proposal_id: &str,
        voter_id: &str,
        decision: VoteDecision,
        reasoning: Option<String>,
    ) -> Result<Vote, ConsensusError> {
        let session = self.get_session(proposal_id).await?;
        let mut vote = Vote {
            proposal_id: proposal_id.to_string(),
            voter_id: voter_id.to_string(),
            decision,
            cast_at: current_timestamp()?,
            term: session.proposal.term,
            signature: None,
            reasoning,
        };
        if self.config.require_signatures {
            vote.signature = Some(compute_vote_digest(&vote));
        }
        self.admit_vote(vote).await
    }

    /// Admit a vote received from a peer. Same validation as local votes.
    async fn process_incoming_vote(&self, vote: Vote) -> Result<(), ConsensusError> {
        self.admit_vote(vote).await.map(|_| ())
    }
}

impl<S, E> ConsensusService<S, E>
where
    S: ConsensusStorage,
    E: ConsensusEventBus,
{
    /// Result of a proposal that is no longer active.
    async fn settled_result(&self, proposal_id: &str) -> Result<ConsensusResult, ConsensusError> {
        match self.storage.get_result(proposal_id).await? {
            Some(result) => Ok(result),
            None if self.is_shut_down() => Err(ConsensusError::EngineShutdown),
            None => Err(ConsensusError::ProposalNotFound),
        }
    }

    /// Decode a `vote_cast` envelope from a peer and admit the vote it carries.
    pub async fn process_incoming_message(&self, bytes: &[u8]) -> Result<(), ConsensusError> {
        let vote = decode_vote(bytes)?;
        self.process_incoming_vote(vote).await
    }
}
