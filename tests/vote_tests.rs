use std::time::Duration;

use agent_consensus::{
    api::ConsensusServiceAPI,
    config::ConsensusConfig,
    error::{ConsensusError, VoteRejection},
    service::DefaultConsensusService,
    types::{CreateProposalRequest, ProposalType, Vote, VoteDecision},
    utils::{
        compute_proposal_digest, compute_vote_digest, current_timestamp, verify_proposal_signature,
    },
};

const PROPOSER: &str = "coordinator";
const MEMBERS: [&str; 5] = ["coordinator", "a", "b", "c", "d"];

fn service(require_signatures: bool) -> DefaultConsensusService {
    let config = ConsensusConfig::builder(PROPOSER)
        .with_signatures(require_signatures)
        .build()
        .expect("valid config");
    let service = DefaultConsensusService::new(config).expect("engine");
    service.add_members(MEMBERS);
    service
}

fn request() -> CreateProposalRequest {
    CreateProposalRequest::new(
        ProposalType::ConfigurationChange,
        b"max_workers=8".to_vec(),
        Duration::from_secs(30),
    )
    .expect("valid request")
}

fn remote_vote(proposal_id: &str, voter: &str, decision: VoteDecision) -> Vote {
    let mut vote = Vote {
        proposal_id: proposal_id.to_string(),
        voter_id: voter.to_string(),
        decision,
        cast_at: current_timestamp().expect("clock"),
        term: None,
        signature: None,
        reasoning: Some("looks safe".to_string()),
    };
    vote.signature = Some(compute_vote_digest(&vote));
    vote
}

// A second vote from the same voter replaces the first.
#[tokio::test]
async fn test_last_vote_wins() {
    let service = service(true);
    let proposal = service
        .create_proposal(request())
        .await
        .expect("proposal");

    service
        .cast_vote(&proposal.id, "a", VoteDecision::Reject, None)
        .await
        .expect("first vote");
    service
        .cast_vote(&proposal.id, "a", VoteDecision::Approve, Some("changed my mind".into()))
        .await
        .expect("second vote");

    let votes = service.get_votes(&proposal.id).await.expect("active");
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].decision, VoteDecision::Approve);
    assert_eq!(votes[0].reasoning.as_deref(), Some("changed my mind"));

    service
        .cast_vote(&proposal.id, "b", VoteDecision::Approve, None)
        .await
        .expect("third vote");
    service
        .cast_vote(&proposal.id, "c", VoteDecision::Approve, None)
        .await
        .expect("deciding vote");
    let result = service.get_result(&proposal.id).await.expect("decided");
    assert_eq!(result.votes.len(), 3);
    assert_eq!(
        result
            .votes
            .iter()
            .filter(|vote| vote.voter_id == "a")
            .count(),
        1
    );
}

// Local votes are signed with the vote digest when signatures are required.
#[tokio::test]
async fn test_local_votes_are_signed() {
    let service = service(true);
    let proposal = service
        .create_proposal(request())
        .await
        .expect("proposal");
    assert!(verify_proposal_signature(&proposal));

    let vote = service
        .cast_vote(&proposal.id, "a", VoteDecision::Approve, None)
        .await
        .expect("vote");
    assert_eq!(vote.signature, Some(compute_vote_digest(&vote)));
}

// Remote votes with a bad or missing signature never reach the session.
#[tokio::test]
async fn test_remote_signature_checks() {
    let service = service(true);
    let proposal = service
        .create_proposal(request())
        .await
        .expect("proposal");

    let mut forged = remote_vote(&proposal.id, "a", VoteDecision::Approve);
    forged.decision = VoteDecision::Reject;
    let err = service
        .process_incoming_vote(forged)
        .await
        .expect_err("forged");
    assert!(matches!(
        err,
        ConsensusError::InvalidVote(VoteRejection::InvalidSignature)
    ));

    let mut unsigned = remote_vote(&proposal.id, "b", VoteDecision::Approve);
    unsigned.signature = None;
    let err = service
        .process_incoming_vote(unsigned)
        .await
        .expect_err("unsigned");
    assert!(matches!(
        err,
        ConsensusError::InvalidVote(VoteRejection::MissingSignature)
    ));

    service
        .process_incoming_vote(remote_vote(&proposal.id, "c", VoteDecision::Approve))
        .await
        .expect("valid remote vote");

    let votes = service.get_votes(&proposal.id).await.expect("active");
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].voter_id, "c");
    assert_eq!(service.get_stats().await.votes_rejected, 2);
}

// With signatures off, unsigned remote votes are accepted.
#[tokio::test]
async fn test_unsigned_votes_when_signatures_disabled() {
    let service = service(false);
    let proposal = service
        .create_proposal(request())
        .await
        .expect("proposal");
    assert!(proposal.signature.is_none());

    let mut vote = remote_vote(&proposal.id, "a", VoteDecision::Approve);
    vote.signature = None;
    service.process_incoming_vote(vote).await.expect("accepted");

    let local = service
        .cast_vote(&proposal.id, "b", VoteDecision::Abstain, None)
        .await
        .expect("local vote");
    assert!(local.signature.is_none());
}

// Votes for proposals the engine does not know are refused.
#[tokio::test]
async fn test_vote_for_unknown_proposal() {
    let service = service(true);
    let err = service
        .process_incoming_vote(remote_vote("missing", "a", VoteDecision::Approve))
        .await
        .expect_err("unknown proposal");
    assert!(matches!(err, ConsensusError::ProposalNotFound));
}

// Digests are deterministic and cover only the identifying fields.
#[test]
fn test_digest_coverage() {
    let request = CreateProposalRequest::with_default_timeout(
        ProposalType::SystemUpdate,
        b"v1.2.0".to_vec(),
    );
    let proposal = request
        .into_proposal(PROPOSER.to_string(), Duration::from_secs(5), true)
        .expect("proposal");
    assert_eq!(
        compute_proposal_digest(&proposal),
        compute_proposal_digest(&proposal.clone())
    );

    let mut edited = proposal.clone();
    edited.content = b"v9.9.9".to_vec();
    assert!(verify_proposal_signature(&edited));

    let mut renamed = proposal.clone();
    renamed.proposer_id = "impostor".to_string();
    assert!(!verify_proposal_signature(&renamed));

    let vote = remote_vote(&proposal.id, "a", VoteDecision::Approve);
    let mut reasoned = vote.clone();
    reasoned.reasoning = None;
    assert_eq!(compute_vote_digest(&vote), compute_vote_digest(&reasoned));

    let mut flipped = vote.clone();
    flipped.decision = VoteDecision::Reject;
    assert_ne!(compute_vote_digest(&vote), compute_vote_digest(&flipped));
}
