use std::time::Duration;

use agent_consensus::{
    config::{ConsensusConfig, GossipConfig, RaftConfig},
    error::ConsensusError,
    types::ConsensusType,
    utils::{
        byzantine_fault_tolerance, byzantine_required_votes, confidence, gossip_required_votes,
        majority_quorum,
    },
};

#[test]
fn test_defaults() {
    let config = ConsensusConfig::builder("agent")
        .build()
        .expect("valid config");
    assert_eq!(config.consensus_type, ConsensusType::Quorum);
    assert_eq!(config.vote_timeout, Duration::from_secs(30));
    assert_eq!(config.max_proposals, 100);
    assert!(config.require_signatures);

    let raft = RaftConfig::default();
    assert_eq!(raft.heartbeat_interval, Duration::from_millis(50));
    assert_eq!(raft.election_timeout, Duration::from_millis(150));
    assert!(raft.log_replication);

    let gossip = GossipConfig::default();
    assert_eq!(gossip.fanout, 3);
    assert_eq!(gossip.max_rounds, 5);
}

#[test]
fn test_presets_are_valid() {
    let raft = ConsensusConfig::builder("agent")
        .raft_preset()
        .build()
        .expect("raft preset");
    assert_eq!(raft.consensus_type, ConsensusType::Raft);
    assert!(raft.raft.is_some());

    let gossip = ConsensusConfig::builder("agent")
        .gossip_preset()
        .build()
        .expect("gossip preset");
    assert_eq!(gossip.consensus_type, ConsensusType::Gossip);
    assert!(gossip.gossip.is_some());
}

#[test]
fn test_invalid_configs() {
    let missing_gossip =
        ConsensusConfig::builder("agent").with_consensus_type(ConsensusType::Gossip);
    assert!(matches!(
        missing_gossip.validate(),
        Err(ConsensusError::ProtocolMisconfigured(_))
    ));

    let slow_heartbeat = ConsensusConfig::builder("agent")
        .with_consensus_type(ConsensusType::Raft)
        .with_raft(RaftConfig {
            heartbeat_interval: Duration::from_millis(200),
            ..RaftConfig::default()
        });
    assert!(matches!(
        slow_heartbeat.build(),
        Err(ConsensusError::ProtocolMisconfigured(_))
    ));

    let bad_threshold = ConsensusConfig::builder("agent")
        .gossip_preset()
        .with_gossip(GossipConfig {
            convergence_threshold: 1.5,
            ..GossipConfig::default()
        });
    assert!(bad_threshold.build().is_err());

    let zero_timeout = ConsensusConfig::builder("agent").with_vote_timeout(Duration::ZERO);
    assert!(matches!(
        zero_timeout.build(),
        Err(ConsensusError::InvalidTimeout)
    ));

    assert!(ConsensusConfig::builder("").build().is_err());
    assert!(
        ConsensusConfig::builder("agent")
            .with_quorum_size(Some(0))
            .build()
            .is_err()
    );
    assert!(matches!(
        ConsensusConfig::builder("agent")
            .with_result_retention(Some(0))
            .build(),
        Err(ConsensusError::ProtocolMisconfigured(_))
    ));
}

#[test]
fn test_threshold_math() {
    assert_eq!(majority_quorum(5), 3);
    assert_eq!(majority_quorum(4), 2);
    assert_eq!(majority_quorum(1), 1);

    assert_eq!(byzantine_fault_tolerance(10), 3);
    assert_eq!(byzantine_fault_tolerance(4), 1);
    assert_eq!(byzantine_fault_tolerance(0), 0);
    assert_eq!(byzantine_required_votes(3), 7);

    assert_eq!(gossip_required_votes(10, 2.0 / 3.0), 7);
    assert_eq!(gossip_required_votes(4, 0.5), 2);

    assert!((confidence(3, 5) - 0.6).abs() < 1e-9);
    assert_eq!(confidence(7, 5), 1.0);
    assert_eq!(confidence(1, 0), 0.0);
}
