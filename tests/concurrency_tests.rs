use futures::future::join_all;
use std::{sync::Arc, time::Duration};
use tokio::{spawn, sync::Barrier};

use agent_consensus::{
    api::ConsensusServiceAPI,
    config::ConsensusConfig,
    error::ConsensusError,
    events::ConsensusEvent,
    service::DefaultConsensusService,
    types::{CreateProposalRequest, ProposalType, Vote, VoteDecision},
    utils::{compute_vote_digest, current_timestamp},
    wire::encode_event,
};

const PROPOSER: &str = "peer-0";
const MEMBER_COUNT: usize = 10;
const PROPOSAL_COUNT: usize = 5;
const RACE_ROUNDS: usize = 20;

fn members() -> Vec<String> {
    (0..MEMBER_COUNT).map(|i| format!("peer-{i}")).collect()
}

fn service() -> Arc<DefaultConsensusService> {
    let config = ConsensusConfig::builder(PROPOSER)
        .build()
        .expect("valid config");
    let service = DefaultConsensusService::new(config).expect("engine");
    service.add_members(members());
    Arc::new(service)
}

fn request() -> CreateProposalRequest {
    CreateProposalRequest::new(
        ProposalType::ResourceAllocation,
        b"gpu-pool:4".to_vec(),
        Duration::from_secs(30),
    )
    .expect("valid request")
}

// All ten members vote at once; the proposal is finalized exactly once and
// votes landing after the decision are refused rather than recorded.
#[tokio::test]
async fn test_concurrent_votes_finalize_once() {
    let service = service();
    let mut events = service.subscribe_to_events();
    let proposal = service
        .create_proposal(request())
        .await
        .expect("proposal");

    let barrier = Arc::new(Barrier::new(MEMBER_COUNT));
    let mut handles = Vec::new();
    for voter in members() {
        let service_clone = Arc::clone(&service);
        let barrier_clone = Arc::clone(&barrier);
        let proposal_id = proposal.id.clone();
        handles.push(spawn(async move {
            barrier_clone.wait().await;
            service_clone
                .cast_vote(&proposal_id, &voter, VoteDecision::Approve, None)
                .await
        }));
    }

    let outcomes: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("task"))
        .collect();
    let accepted = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    assert!(accepted >= 5, "quorum of 5 must be admitted, got {accepted}");
    assert!(outcomes.iter().all(|outcome| match outcome {
        Ok(_) => true,
        Err(ConsensusError::ProposalNotFound) => true,
        Err(_) => false,
    }));

    let result = service.get_result(&proposal.id).await.expect("decided");
    assert_eq!(result.decision, VoteDecision::Approve);
    assert!(result.votes.len() >= 5);

    let mut reached = 0;
    while let Ok(event) = events.try_recv() {
        if let ConsensusEvent::ConsensusReached(reached_result) = event {
            assert_eq!(reached_result, result);
            reached += 1;
        }
    }
    assert_eq!(reached, 1);
}

// Several waiters on one proposal all see the same result.
#[tokio::test]
async fn test_many_waiters_one_result() {
    let service = service();
    let proposal = service
        .create_proposal(request())
        .await
        .expect("proposal");

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let service = Arc::clone(&service);
            let proposal_id = proposal.id.clone();
            spawn(async move { service.wait_for_result(&proposal_id).await })
        })
        .collect();

    for voter in &members()[1..6] {
        service
            .cast_vote(&proposal.id, voter, VoteDecision::Reject, None)
            .await
            .expect("vote");
    }

    let results: Vec<_> = join_all(waiters)
        .await
        .into_iter()
        .map(|joined| joined.expect("task").expect("result"))
        .collect();
    assert!(results.iter().all(|result| *result == results[0]));
    assert_eq!(results[0].decision, VoteDecision::Reject);
}

// Proposals are independent: concurrent voting on several does not mix them up.
#[tokio::test]
async fn test_concurrent_proposals() {
    let service = service();
    let mut proposals = Vec::new();
    for _ in 0..PROPOSAL_COUNT {
        proposals.push(
            service
                .create_proposal(request())
                .await
                .expect("proposal"),
        );
    }

    let handles: Vec<_> = proposals
        .iter()
        .enumerate()
        .flat_map(|(i, proposal)| {
            let decision = if i % 2 == 0 {
                VoteDecision::Approve
            } else {
                VoteDecision::Reject
            };
            members()
                .into_iter()
                .skip(1)
                .take(5)
                .map(move |voter| (proposal.id.clone(), voter, decision))
        })
        .map(|(proposal_id, voter, decision)| {
            let service = Arc::clone(&service);
            spawn(async move {
                service
                    .cast_vote(&proposal_id, &voter, decision, None)
                    .await
            })
        })
        .collect();
    for joined in join_all(handles).await {
        joined.expect("task").expect("vote");
    }

    for (i, proposal) in proposals.iter().enumerate() {
        let result = service.get_result(&proposal.id).await.expect("decided");
        let expected = if i % 2 == 0 {
            VoteDecision::Approve
        } else {
            VoteDecision::Reject
        };
        assert_eq!(result.decision, expected);
        assert!(result.votes.iter().all(|vote| vote.proposal_id == proposal.id));
    }

    let stats = service.get_stats().await;
    assert_eq!(stats.proposals_submitted, PROPOSAL_COUNT as u64);
    assert_eq!(stats.proposals_accepted, 3);
    assert_eq!(stats.proposals_rejected, 2);
    assert_eq!(stats.votes_cast, (PROPOSAL_COUNT * 5) as u64);
}

fn remote_vote(proposal_id: &str, voter: &str) -> Vote {
    let mut vote = Vote {
        proposal_id: proposal_id.to_string(),
        voter_id: voter.to_string(),
        decision: VoteDecision::Approve,
        cast_at: current_timestamp().expect("clock"),
        term: None,
        signature: None,
        reasoning: None,
    };
    vote.signature = Some(compute_vote_digest(&vote));
    vote
}

// The deciding votes arrive at the same time through the local path and as
// bytes from a peer; each proposal still gets one result and one event.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_local_and_remote_deciding_votes_finalize_once() {
    let service = service();
    let mut events = service.subscribe_to_events();

    for _ in 0..RACE_ROUNDS {
        let proposal = service
            .create_proposal(request())
            .await
            .expect("proposal");
        for voter in &members()[1..5] {
            service
                .cast_vote(&proposal.id, voter, VoteDecision::Approve, None)
                .await
                .expect("vote");
        }
        assert!(service.get_result(&proposal.id).await.is_none());

        let barrier = Arc::new(Barrier::new(3));
        let local = {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            let proposal_id = proposal.id.clone();
            spawn(async move {
                barrier.wait().await;
                service
                    .cast_vote(&proposal_id, "peer-5", VoteDecision::Approve, None)
                    .await
                    .map(|_| ())
            })
        };
        let remote = {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            let bytes = encode_event(&ConsensusEvent::VoteCast(remote_vote(
                &proposal.id,
                "peer-6",
            )));
            spawn(async move {
                barrier.wait().await;
                service.process_incoming_message(&bytes).await
            })
        };
        let direct = {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            let vote = remote_vote(&proposal.id, "peer-7");
            spawn(async move {
                barrier.wait().await;
                service.process_incoming_vote(vote).await
            })
        };

        let outcomes: Vec<_> = join_all([local, remote, direct])
            .await
            .into_iter()
            .map(|joined| joined.expect("task"))
            .collect();
        assert!(outcomes.iter().any(|outcome| outcome.is_ok()));
        assert!(outcomes.iter().all(|outcome| matches!(
            outcome,
            Ok(()) | Err(ConsensusError::ProposalNotFound)
        )));

        let result = service.get_result(&proposal.id).await.expect("decided");
        assert_eq!(result.decision, VoteDecision::Approve);
        assert!(result.votes.len() >= 5);

        let mut reached = 0;
        while let Ok(event) = events.try_recv() {
            if let ConsensusEvent::ConsensusReached(reached_result) = event {
                assert_eq!(reached_result, result);
                reached += 1;
            }
        }
        assert_eq!(reached, 1);
    }
}
