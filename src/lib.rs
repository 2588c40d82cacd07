//! A consensus engine for groups of cooperating agents.
//!
//! An agent puts a [`types::Proposal`] to its peers, the peers answer with
//! [`types::Vote`]s, and the engine settles each proposal exactly once into a
//! [`types::ConsensusResult`], either when the configured protocol reaches a
//! verdict or when the proposal's deadline passes.
//!
//! ## Protocols
//!
//! The protocol is picked once, in [`config::ConsensusConfig`]:
//!
//! - **Quorum**: a simple majority of known members.
//! - **Raft**: only the elected leader creates and decides proposals; votes are
//!   checked against the current term.
//! - **Byzantine**: `2f+1` agreeing votes, announced as prepare, prepared and commit.
//! - **Gossip**: proposals spread to random peers for a number of rounds before
//!   the votes are counted.
//! - **Paxos**: prepare/accept hooks only; proposals resolve by expiry.
//!
//! The main entry point is [`service::ConsensusService`]. Outbound traffic is
//! published on a [`events::ConsensusEventBus`] for a transport to deliver, and
//! [`wire`] encodes those events for the network.

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod membership;
pub mod protocols;
pub mod raft;
pub mod service;
pub mod service_consensus;
pub mod service_stats;
pub mod session;
pub mod storage;
pub mod types;
pub mod utils;
pub mod wire;
