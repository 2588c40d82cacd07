use std::time::Duration;

use agent_consensus::{
    api::ConsensusServiceAPI,
    config::ConsensusConfig,
    error::ConsensusError,
    events::ConsensusEvent,
    service::DefaultConsensusService,
    types::{CreateProposalRequest, ProposalType, VoteDecision},
    utils::compute_vote_digest,
    wire::{WireBody, WireEnvelope, WireVote, decode_envelope, decode_vote, encode_event},
};
use prost::Message;

fn service(agent_id: &str) -> DefaultConsensusService {
    let config = ConsensusConfig::builder(agent_id)
        .build()
        .expect("valid config");
    let service = DefaultConsensusService::new(config).expect("engine");
    service.add_members(["alpha", "beta", "gamma"]);
    service
}

// A vote cast on one engine travels as bytes and is admitted by another.
#[tokio::test]
async fn test_vote_crosses_the_wire() {
    let alpha = service("alpha");
    let mut alpha_events = alpha.subscribe_to_events();

    let proposal = alpha
        .create_proposal(
            CreateProposalRequest::new(
                ProposalType::TaskAssignment,
                b"index shard 12".to_vec(),
                Duration::from_secs(30),
            )
            .expect("valid request"),
        )
        .await
        .expect("proposal");
    let broadcast = alpha_events.recv().await.expect("broadcast");
    let envelope = decode_envelope(&encode_event(&broadcast)).expect("decodes");
    assert_eq!(envelope.topic, "proposal_broadcast");
    match envelope.body {
        Some(WireBody::ProposalBroadcast(sent)) => {
            let wire_proposal = sent.proposal.expect("proposal attached");
            assert_eq!(wire_proposal.id, proposal.id);
            assert_eq!(wire_proposal.content, proposal.content);
            assert_eq!(sent.targets, vec!["beta", "gamma"]);
        }
        other => panic!("unexpected body {other:?}"),
    }

    let beta_vote = alpha
        .cast_vote(&proposal.id, "beta", VoteDecision::Approve, Some("ready".into()))
        .await
        .expect("vote");
    let bytes = encode_event(&ConsensusEvent::VoteCast(beta_vote.clone()));
    assert_eq!(decode_vote(&bytes).expect("vote decodes"), beta_vote);

    let gamma_vote = {
        let mut vote = beta_vote.clone();
        vote.voter_id = "gamma".to_string();
        vote.signature = Some(compute_vote_digest(&vote));
        vote
    };
    alpha
        .process_incoming_message(&encode_event(&ConsensusEvent::VoteCast(gamma_vote)))
        .await
        .expect("remote vote admitted");

    let result = alpha.get_result(&proposal.id).await.expect("decided");
    assert_eq!(result.votes.len(), 2);
    let reached = decode_envelope(&encode_event(&ConsensusEvent::ConsensusReached(result)))
        .expect("decodes");
    assert_eq!(reached.topic, "consensus_reached");
}

// Only vote envelopes decode as votes; garbage fails to decode at all.
#[test]
fn test_decode_errors() {
    let shutdown = encode_event(&ConsensusEvent::Shutdown {
        dropped: vec!["p-1".to_string()],
    });
    assert!(matches!(
        decode_vote(&shutdown),
        Err(ConsensusError::InvalidWireMessage(_))
    ));
    assert!(matches!(
        decode_vote(&[0xff, 0xff, 0xff]),
        Err(ConsensusError::Decode(_))
    ));
}

// A vote envelope whose decision field was never set is not a vote.
#[tokio::test]
async fn test_vote_without_decision_is_refused() {
    let alpha = service("alpha");
    let proposal = alpha
        .create_proposal(
            CreateProposalRequest::new(
                ProposalType::TaskAssignment,
                b"index shard 13".to_vec(),
                Duration::from_secs(30),
            )
            .expect("valid request"),
        )
        .await
        .expect("proposal");

    let bytes = WireEnvelope {
        topic: "vote_cast".to_string(),
        body: Some(WireBody::VoteCast(WireVote {
            proposal_id: proposal.id.clone(),
            voter_id: "beta".to_string(),
            decision: 0,
            cast_at: proposal.created_at,
            term: None,
            signature: None,
            reasoning: None,
        })),
    }
    .encode_to_vec();

    assert!(matches!(
        decode_vote(&bytes),
        Err(ConsensusError::InvalidWireMessage(_))
    ));
    assert!(matches!(
        alpha.process_incoming_message(&bytes).await,
        Err(ConsensusError::InvalidWireMessage(_))
    ));
    assert!(alpha.get_votes(&proposal.id).await.expect("active").is_empty());
}
