use crate::{
    error::ConsensusError,
    events::ConsensusEventBus,
    storage::ConsensusStorage,
    types::{ConsensusResult, CreateProposalRequest, Proposal, Vote, VoteDecision},
};

pub trait ConsensusServiceAPI<S, E>
where
    S: ConsensusStorage,
    E: ConsensusEventBus,
{
    fn create_proposal(
        &self,
        request: CreateProposalRequest,
    ) -> impl Future<Output = Result<Proposal, ConsensusError>> + Send;
    fn wait_for_result(
        &self,
        proposal_id: &str,
    ) -> impl Future<Output = Result<ConsensusResult, ConsensusError>> + Send;
    fn submit(
        &self,
        request: CreateProposalRequest,
    ) -> impl Future<Output = Result<ConsensusResult, ConsensusError>> + Send;

    fn cast_vote(
        &self,
        proposal_id: &str,
        voter_id: &str,
        decision: VoteDecision,
        reasoning: Option<String>,
    ) -> impl Future<Output = Result<Vote, ConsensusError>> + Send;
    fn process_incoming_vote(
        &self,
        vote: Vote,
    ) -> impl Future<Output = Result<(), ConsensusError>> + Send;
}
