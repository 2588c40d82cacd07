use std::time::Duration;

use crate::{
    error::ConsensusError,
    types::{AgentId, ConsensusType},
    utils::{validate_threshold, validate_timeout},
};

/// Timers for the Raft protocol. Required when `consensus_type` is Raft.
#[derive(Debug, Clone, PartialEq)]
pub struct RaftConfig {
    /// How often a leader sends empty append-entries.
    pub heartbeat_interval: Duration,
    /// Lower bound of the randomized election timer; the upper bound is twice this.
    pub election_timeout: Duration,
    /// Silence after which a follower forgets the current leader.
    pub leader_timeout: Duration,
    /// Replicate proposals through the log. When false the leader only broadcasts.
    pub log_replication: bool,
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(50),
            election_timeout: Duration::from_millis(150),
            leader_timeout: Duration::from_millis(300),
            log_replication: true,
        }
    }
}

/// Fan-out parameters for the gossip protocol. Required when `consensus_type` is Gossip.
#[derive(Debug, Clone, PartialEq)]
pub struct GossipConfig {
    /// Members contacted per round.
    pub fanout: usize,
    pub gossip_interval: Duration,
    /// Fraction of members whose votes must be collected, `(0, 1]`.
    pub convergence_threshold: f64,
    /// Rounds after which a proposal counts as converged.
    pub max_rounds: u32,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            fanout: 3,
            gossip_interval: Duration::from_millis(100),
            convergence_threshold: 2.0 / 3.0,
            max_rounds: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    /// Identity of this engine; stamped as proposer and used as Raft candidate id.
    pub agent_id: AgentId,
    pub consensus_type: ConsensusType,
    /// Fixed quorum for the Quorum protocol. `None` means `ceil(N/2)`.
    pub quorum_size: Option<usize>,
    /// Timeout used by requests that don't carry their own.
    pub vote_timeout: Duration,
    /// Upper bound on in-flight proposals.
    pub max_proposals: usize,
    pub require_signatures: bool,
    /// Minimum `f` for the Byzantine protocol; never lowers `floor((N-1)/3)`.
    pub byzantine_tolerance: Option<usize>,
    /// How often the reaper scans for expired proposals.
    pub reaper_interval: Duration,
    /// Keep at most this many finalized results. `None` keeps all of them.
    pub result_retention: Option<usize>,
    pub raft: Option<RaftConfig>,
    pub gossip: Option<GossipConfig>,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            agent_id: "agent".to_string(),
            consensus_type: ConsensusType::Quorum,
            quorum_size: None,
            vote_timeout: Duration::from_secs(30),
            max_proposals: 100,
            require_signatures: true,
            byzantine_tolerance: None,
            reaper_interval: Duration::from_secs(30),
            result_retention: None,
            raft: None,
            gossip: None,
        }
    }
}

impl ConsensusConfig {
    pub fn builder(agent_id: impl Into<AgentId>) -> ConsensusConfigBuilder {
        ConsensusConfigBuilder::new(agent_id)
    }

    /// Check that the selected protocol has everything it needs.
    pub fn validate(&self) -> Result<(), ConsensusError> {
        if self.agent_id.is_empty() {
            return Err(ConsensusError::ProtocolMisconfigured(
                "agent_id must not be empty".to_string(),
            ));
        }
        validate_timeout(self.vote_timeout)?;
        if self.reaper_interval.is_zero() {
            return Err(ConsensusError::ProtocolMisconfigured(
                "reaper_interval must be greater than zero".to_string(),
            ));
        }
        if self.max_proposals == 0 {
            return Err(ConsensusError::ProtocolMisconfigured(
                "max_proposals must be greater than zero".to_string(),
            ));
        }
        if self.quorum_size == Some(0) {
            return Err(ConsensusError::ProtocolMisconfigured(
                "quorum_size must be greater than zero".to_string(),
            ));
        }
        if self.result_retention == Some(0) {
            return Err(ConsensusError::ProtocolMisconfigured(
                "result_retention must be greater than zero".to_string(),
            ));
        }

        match self.consensus_type {
            ConsensusType::Raft => {
                let raft = self.raft.as_ref().ok_or_else(|| {
                    ConsensusError::ProtocolMisconfigured(
                        "raft protocol requires raft config".to_string(),
                    )
                })?;
                if raft.heartbeat_interval.is_zero() || raft.election_timeout.is_zero() {
                    return Err(ConsensusError::ProtocolMisconfigured(
                        "raft heartbeat and election intervals must be greater than zero"
                            .to_string(),
                    ));
                }
                if raft.heartbeat_interval >= raft.election_timeout {
                    return Err(ConsensusError::ProtocolMisconfigured(
                        "raft heartbeat interval must be shorter than the election timeout"
                            .to_string(),
                    ));
                }
            }
            ConsensusType::Gossip => {
                let gossip = self.gossip.as_ref().ok_or_else(|| {
                    ConsensusError::ProtocolMisconfigured(
                        "gossip protocol requires gossip config".to_string(),
                    )
                })?;
                if gossip.fanout == 0 || gossip.max_rounds == 0 {
                    return Err(ConsensusError::ProtocolMisconfigured(
                        "gossip fanout and max_rounds must be greater than zero".to_string(),
                    ));
                }
                if gossip.gossip_interval.is_zero() {
                    return Err(ConsensusError::ProtocolMisconfigured(
                        "gossip interval must be greater than zero".to_string(),
                    ));
                }
                validate_threshold(gossip.convergence_threshold)?;
            }
            ConsensusType::Quorum | ConsensusType::Byzantine | ConsensusType::Paxos => {}
        }
        Ok(())
    }
}

pub struct ConsensusConfigBuilder {
    config: ConsensusConfig,
}

impl ConsensusConfigBuilder {
    pub(crate) fn new(agent_id: impl Into<AgentId>) -> Self {
        Self {
            config: ConsensusConfig {
                agent_id: agent_id.into(),
                ..ConsensusConfig::default()
            },
        }
    }

    pub fn with_consensus_type(mut self, consensus_type: ConsensusType) -> Self {
        self.config.consensus_type = consensus_type;
        self
    }

    pub fn with_quorum_size(mut self, quorum_size: Option<usize>) -> Self {
        self.config.quorum_size = quorum_size;
        self
    }

    pub fn with_vote_timeout(mut self, vote_timeout: Duration) -> Self {
        self.config.vote_timeout = vote_timeout;
        self
    }

    pub fn with_max_proposals(mut self, max_proposals: usize) -> Self {
        self.config.max_proposals = max_proposals;
        self
    }

    pub fn with_signatures(mut self, require_signatures: bool) -> Self {
        self.config.require_signatures = require_signatures;
        self
    }

    pub fn with_byzantine_tolerance(mut self, tolerance: Option<usize>) -> Self {
        self.config.byzantine_tolerance = tolerance;
        self
    }

    pub fn with_reaper_interval(mut self, interval: Duration) -> Self {
        self.config.reaper_interval = interval;
        self
    }

    pub fn with_result_retention(mut self, retention: Option<usize>) -> Self {
        self.config.result_retention = retention;
        self
    }

    pub fn with_raft(mut self, raft: RaftConfig) -> Self {
        self.config.raft = Some(raft);
        self
    }

    pub fn with_gossip(mut self, gossip: GossipConfig) -> Self {
        self.config.gossip = Some(gossip);
        self
    }

    /// Raft preset with default timers.
    pub fn raft_preset(self) -> Self {
        self.with_consensus_type(ConsensusType::Raft)
            .with_raft(RaftConfig::default())
    }

    /// Gossip preset with default fan-out.
    pub fn gossip_preset(self) -> Self {
        self.with_consensus_type(ConsensusType::Gossip)
            .with_gossip(GossipConfig::default())
    }

    pub fn validate(&self) -> Result<(), ConsensusError> {
        self.config.validate()
    }

    pub fn build(self) -> Result<ConsensusConfig, ConsensusError> {
        self.validate()?;
        Ok(self.config)
    }
}
