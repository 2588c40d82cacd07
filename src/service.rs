use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{interval, sleep},
};
use tracing::{debug, info, warn};

use crate::{
    config::ConsensusConfig,
    error::ConsensusError,
    events::{BroadcastEventBus, ConsensusEvent, ConsensusEventBus},
    membership::MembershipRegistry,
    protocols::{ProtocolStrategy, build_strategy},
    raft::{RaftNode, RaftState, RaftVoteRequest},
    service_stats::StatsRecorder,
    session::ConsensusSession,
    storage::{ConsensusStorage, InMemoryConsensusStorage},
    types::{AgentId, ConsensusResult, ConsensusType, Proposal, ProposalId, Vote},
    utils::{current_timestamp, verify_vote_signature},
};

type Waiters = HashMap<ProposalId, Vec<oneshot::Sender<ConsensusResult>>>;

/// The consensus engine for one agent.
///
/// Cloning is cheap and every clone drives the same engine; background tasks
/// started by [`ConsensusService::start`] hold clones of their own.
pub struct ConsensusService<S, E>
where
    S: ConsensusStorage,
    E: ConsensusEventBus,
{
    pub(crate) config: Arc<ConsensusConfig>,
    pub(crate) storage: Arc<S>,
    event_bus: E,
    membership: Arc<MembershipRegistry>,
    pub(crate) strategy: Arc<dyn ProtocolStrategy>,
    raft: Option<Arc<RaftNode>>,
    pub(crate) stats: Arc<Mutex<StatsRecorder>>,
    waiters: Arc<Mutex<Waiters>>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    shut_down: Arc<AtomicBool>,
}

impl<S, E> Clone for ConsensusService<S, E>
where
    S: ConsensusStorage,
    E: ConsensusEventBus,
{
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            storage: Arc::clone(&self.storage),
            event_bus: self.event_bus.clone(),
            membership: Arc::clone(&self.membership),
            strategy: Arc::clone(&self.strategy),
            raft: self.raft.clone(),
            stats: Arc::clone(&self.stats),
            waiters: Arc::clone(&self.waiters),
            tasks: Arc::clone(&self.tasks),
            shut_down: Arc::clone(&self.shut_down),
        }
    }
}

pub type DefaultConsensusService = ConsensusService<InMemoryConsensusStorage, BroadcastEventBus>;

impl DefaultConsensusService {
    /// Engine with in-memory storage and a broadcast event bus.
    pub fn new(config: ConsensusConfig) -> Result<Self, ConsensusError> {
        Self::new_with_components(
            config,
            Arc::new(InMemoryConsensusStorage::new()),
            BroadcastEventBus::default(),
        )
    }
}

impl<S, E> ConsensusService<S, E>
where
    S: ConsensusStorage,
    E: ConsensusEventBus,
{
    /// Validate `config` and assemble the engine around the given storage and bus.
    ///
    /// Nothing runs in the background until [`ConsensusService::start`] is called.
    pub fn new_with_components(
        config: ConsensusConfig,
        storage: Arc<S>,
        event_bus: E,
    ) -> Result<Self, ConsensusError> {
        config.validate()?;

        let raft = match (&config.consensus_type, &config.raft) {
            (ConsensusType::Raft, Some(raft)) => Some(Arc::new(RaftNode::new(
                config.agent_id.clone(),
                raft.clone(),
            ))),
            _ => None,
        };
        let strategy = build_strategy(&config, raft.clone())?;
        if config.consensus_type == ConsensusType::Paxos {
            warn!(
                "Agent {} configured for paxos; proposals resolve only by expiry",
                config.agent_id
            );
        }
        info!(
            "Consensus engine for agent {} using {} protocol",
            config.agent_id, config.consensus_type
        );

        Ok(Self {
            config: Arc::new(config),
            storage,
            event_bus,
            membership: Arc::new(MembershipRegistry::new()),
            strategy,
            raft,
            stats: Arc::new(Mutex::new(StatsRecorder::default())),
            waiters: Arc::new(Mutex::new(HashMap::new())),
            tasks: Arc::new(Mutex::new(Vec::new())),
            shut_down: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn agent_id(&self) -> &str {
        &self.config.agent_id
    }

    pub fn consensus_type(&self) -> ConsensusType {
        self.strategy.consensus_type()
    }

    pub fn subscribe_to_events(&self) -> E::Receiver {
        self.event_bus.subscribe()
    }

    pub(crate) fn emit_event(&self, event: ConsensusEvent) {
        debug!("Publishing {} event", event.topic());
        self.event_bus.publish(event);
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Add peers to the membership. Returns how many were new.
    ///
    /// Thresholds of proposals already in flight are re-evaluated against the
    /// new size on their next vote.
    pub fn add_members<I, A>(&self, ids: I) -> usize
    where
        I: IntoIterator<Item = A>,
        A: Into<AgentId>,
    {
        let added = self.membership.add_members(ids);
        if added > 0 {
            info!(
                "Agent {} added {added} members ({} total)",
                self.config.agent_id,
                self.membership.len()
            );
        }
        added
    }

    /// Remove peers from the membership. Returns how many were present.
    pub fn remove_members<I, A>(&self, ids: I) -> usize
    where
        I: IntoIterator<Item = A>,
        A: AsRef<str>,
    {
        let removed = self.membership.remove_members(ids);
        if removed > 0 {
            info!(
                "Agent {} removed {removed} members ({} total)",
                self.config.agent_id,
                self.membership.len()
            );
        }
        removed
    }

    pub fn members(&self) -> Vec<AgentId> {
        self.membership.snapshot()
    }

    pub(crate) async fn get_session(
        &self,
        proposal_id: &str,
    ) -> Result<ConsensusSession, ConsensusError> {
        self.storage
            .get_session(proposal_id)
            .await?
            .ok_or(ConsensusError::ProposalNotFound)
    }

    /// Live votes of an active proposal, at most one per voter.
    pub async fn get_votes(&self, proposal_id: &str) -> Result<Vec<Vote>, ConsensusError> {
        Ok(self.get_session(proposal_id).await?.votes)
    }

    pub async fn get_result(&self, proposal_id: &str) -> Option<ConsensusResult> {
        self.storage.get_result(proposal_id).await.ok().flatten()
    }

    pub async fn get_active_proposals(&self) -> Vec<Proposal> {
        self.storage
            .list_active_sessions()
            .await
            .map(|sessions| {
                sessions
                    .into_iter()
                    .map(|session| session.proposal)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Check a vote against signature policy and the active protocol's rules.
    fn validate_vote(&self, vote: &Vote) -> Result<(), ConsensusError> {
        if self.config.require_signatures {
            verify_vote_signature(vote)?;
        }
        self.strategy.validate_vote(vote, &self.membership)?;
        Ok(())
    }

    /// Admit a vote into its proposal and finalize the proposal if it is now decided.
    pub(crate) async fn admit_vote(&self, vote: Vote) -> Result<Vote, ConsensusError> {
        let session = self.get_session(&vote.proposal_id).await?;
        let now = current_timestamp()?;
        if session.proposal.is_expired_at(now) {
            return Err(ConsensusError::ProposalExpired);
        }

        if let Err(err) = self.validate_vote(&vote) {
            self.stats.lock().vote_rejected();
            warn!(
                "Rejected vote from {} on proposal {}: {err}",
                vote.voter_id, vote.proposal_id
            );
            return Err(err);
        }

        let admitted = vote.clone();
        let replaced = self
            .storage
            .update_session(&admitted.proposal_id, move |session| session.add_vote(vote))
            .await?;
        self.stats.lock().vote_cast();
        if replaced.is_some() {
            debug!(
                "Vote from {} on proposal {} replaced an earlier vote",
                admitted.voter_id, admitted.proposal_id
            );
        }
        self.emit_event(ConsensusEvent::VoteCast(admitted.clone()));

        self.try_finalize(&admitted.proposal_id).await?;
        Ok(admitted)
    }

    /// Ask the protocol for a verdict and finalize the proposal if it has one.
    pub(crate) async fn try_finalize(
        &self,
        proposal_id: &str,
    ) -> Result<Option<ConsensusResult>, ConsensusError> {
        let members = self.membership.snapshot();
        let strategy = Arc::clone(&self.strategy);
        let now = current_timestamp()?;
        let settled = self
            .storage
            .finalize_with(proposal_id, |session| {
                strategy
                    .evaluate(session, members.len())
                    .map(|verdict| session.to_result(verdict, &members, now))
            })
            .await?;

        match settled {
            Some((session, result)) => {
                self.complete(session, &result, false).await?;
                Ok(Some(result))
            }
            None => Ok(None),
        }
    }

    /// Finalize a proposal as timed out, whatever its deadline says.
    ///
    /// Returns `None` if the proposal is no longer active.
    pub(crate) async fn expire_proposal(
        &self,
        proposal_id: &str,
    ) -> Result<Option<ConsensusResult>, ConsensusError> {
        self.expire_where(proposal_id, |_| true).await
    }

    async fn expire_where<P>(
        &self,
        proposal_id: &str,
        predicate: P,
    ) -> Result<Option<ConsensusResult>, ConsensusError>
    where
        P: FnOnce(&Proposal) -> bool + Send,
    {
        let members = self.membership.snapshot();
        let now = current_timestamp()?;
        let settled = self
            .storage
            .finalize_with(proposal_id, |session| {
                predicate(&session.proposal).then(|| session.to_timeout_result(&members, now))
            })
            .await?;

        match settled {
            Some((session, result)) => {
                info!(
                    "Proposal {proposal_id} expired with {} votes",
                    session.votes.len()
                );
                self.complete(session, &result, true).await?;
                Ok(Some(result))
            }
            None => Ok(None),
        }
    }

    /// One reaper pass: finalize every active proposal whose deadline has passed.
    ///
    /// Returns how many proposals were expired.
    pub async fn reap_expired(&self) -> Result<usize, ConsensusError> {
        let now = current_timestamp()?;
        let expired: Vec<ProposalId> = self
            .storage
            .list_active_sessions()
            .await?
            .into_iter()
            .filter(|session| session.proposal.is_expired_at(now))
            .map(|session| session.proposal.id)
            .collect();

        let mut reaped = 0;
        for proposal_id in expired {
            if self
                .expire_where(&proposal_id, |proposal| proposal.is_expired_at(now))
                .await?
                .is_some()
            {
                reaped += 1;
            }
        }
        Ok(reaped)
    }

    /// Advance every active proposal by one gossip round.
    pub async fn gossip_round(&self) -> Result<(), ConsensusError> {
        let members = self.membership.snapshot();
        for session in self.storage.list_active_sessions().await? {
            let proposal_id = session.proposal.id;
            let strategy = Arc::clone(&self.strategy);
            let events = match self
                .storage
                .update_session(&proposal_id, |session| {
                    Ok(strategy.tick(session, &members))
                })
                .await
            {
                Ok(events) => events,
                Err(ConsensusError::ProposalNotFound) => continue,
                Err(err) => return Err(err),
            };
            for event in events {
                self.emit_event(event);
            }
            self.try_finalize(&proposal_id).await?;
        }
        Ok(())
    }

    /// Bookkeeping once a session has left the active set.
    async fn complete(
        &self,
        session: ConsensusSession,
        result: &ConsensusResult,
        timed_out: bool,
    ) -> Result<(), ConsensusError> {
        self.stats
            .lock()
            .finalized(result, session.proposal.created_at, timed_out);
        info!(
            "Proposal {} finalized as {:?} with confidence {:.2} ({} votes)",
            result.proposal_id,
            result.decision,
            result.confidence,
            result.votes.len()
        );

        for event in self.strategy.on_finalized(&session, result, timed_out) {
            self.emit_event(event);
        }
        self.emit_event(ConsensusEvent::ConsensusReached(result.clone()));

        let waiting = self.waiters.lock().remove(&result.proposal_id);
        for waiter in waiting.into_iter().flatten() {
            let _ = waiter.send(result.clone());
        }

        if let Some(retain) = self.config.result_retention {
            let evicted = self.storage.trim_results(retain).await?;
            if evicted > 0 {
                debug!("Evicted {evicted} old results");
            }
        }
        Ok(())
    }

    pub(crate) fn register_waiter(&self, proposal_id: &str) -> oneshot::Receiver<ConsensusResult> {
        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .entry(proposal_id.to_string())
            .or_default()
            .push(tx);
        rx
    }

    pub(crate) fn drop_waiters(&self, proposal_id: &str) {
        self.waiters.lock().remove(proposal_id);
    }

    /// Spawn the background loops: the expiry reaper, plus gossip rounds or the
    /// raft timer depending on the protocol. Calling it again is a no-op.
    pub fn start(&self) {
        if self.is_shut_down() {
            return;
        }
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }

        tasks.push(self.spawn_reaper());
        if let Some(gossip) = &self.config.gossip {
            if self.config.consensus_type == ConsensusType::Gossip {
                tasks.push(self.spawn_gossip(gossip.gossip_interval));
            }
        }
        if let Some(node) = &self.raft {
            tasks.push(self.spawn_raft_timer(Arc::clone(node)));
        }
        info!(
            "Agent {} started {} background tasks",
            self.config.agent_id,
            tasks.len()
        );
    }

    fn spawn_reaper(&self) -> JoinHandle<()> {
        let service = self.clone();
        let period = self.config.reaper_interval;
        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                match service.reap_expired().await {
                    Ok(0) => {}
                    Ok(reaped) => info!("Reaper expired {reaped} proposals"),
                    Err(err) => warn!("Reaper pass failed: {err}"),
                }
            }
        })
    }

    fn spawn_gossip(&self, period: Duration) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                if let Err(err) = service.gossip_round().await {
                    warn!("Gossip round failed: {err}");
                }
            }
        })
    }

    fn spawn_raft_timer(&self, node: Arc<RaftNode>) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            loop {
                if node.is_leader() {
                    sleep(node.config().heartbeat_interval).await;
                    if let Some(heartbeat) = node.heartbeat() {
                        service.emit_event(ConsensusEvent::RaftAppendEntries(heartbeat));
                    }
                    continue;
                }

                let timeout = node.election_timeout();
                sleep(timeout).await;
                node.expire_silent_leader();
                if node.is_leader() || node.since_heartbeat() < timeout {
                    continue;
                }
                if let Some(request) = node.start_election() {
                    service.emit_event(ConsensusEvent::RaftVoteRequest(request));
                }
            }
        })
    }

    /// Stop background tasks and drop every active proposal.
    ///
    /// Pending waiters resolve with [`ConsensusError::EngineShutdown`]. Results
    /// already recorded stay readable.
    pub async fn shutdown(&self) -> Result<(), ConsensusError> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            task.abort();
        }

        let dropped = self.storage.clear_active().await?;
        self.waiters.lock().clear();
        info!(
            "Agent {} shut down, dropped {} active proposals",
            self.config.agent_id,
            dropped.len()
        );
        self.emit_event(ConsensusEvent::Shutdown { dropped });
        Ok(())
    }

    fn raft_node(&self) -> Result<&Arc<RaftNode>, ConsensusError> {
        self.raft
            .as_ref()
            .ok_or(ConsensusError::ProtocolUnsupported("raft operations"))
    }

    pub fn raft_state(&self) -> Option<RaftState> {
        self.raft.as_ref().map(|node| node.snapshot())
    }

    /// Campaign for leadership and publish the vote request.
    pub fn start_election(&self) -> Result<Option<RaftVoteRequest>, ConsensusError> {
        let request = self.raft_node()?.start_election();
        if let Some(request) = &request {
            self.emit_event(ConsensusEvent::RaftVoteRequest(request.clone()));
        }
        Ok(request)
    }

    /// Promote this candidate after it won a majority, announcing it with a heartbeat.
    ///
    /// Returns false if the node was not campaigning.
    pub fn become_leader(&self) -> Result<bool, ConsensusError> {
        let members = self.membership.snapshot();
        match self.raft_node()?.become_leader(&members) {
            Some(heartbeat) => {
                self.emit_event(ConsensusEvent::RaftAppendEntries(heartbeat));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Apply a heartbeat from `leader_id`. Returns false if its term is stale.
    pub fn handle_heartbeat(
        &self,
        term: u64,
        leader_id: impl Into<AgentId>,
    ) -> Result<bool, ConsensusError> {
        Ok(self.raft_node()?.observe_leader(term, leader_id.into()))
    }

    /// Answer a peer's vote request. Returns whether the vote was granted.
    pub fn handle_vote_request(&self, request: &RaftVoteRequest) -> Result<bool, ConsensusError> {
        Ok(self.raft_node()?.handle_vote_request(request))
    }
}
