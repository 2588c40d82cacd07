use sha2::{Digest, Sha256};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::{
    error::{ConsensusError, VoteRejection},
    types::{Proposal, Vote},
};

/// Generate a random proposal id from a v4 UUID.
pub fn generate_proposal_id() -> String {
    Uuid::new_v4().to_string()
}

/// Milliseconds since Unix epoch.
pub fn current_timestamp() -> Result<u64, ConsensusError> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis() as u64)
}

/// Digest attached to a proposal at creation.
///
/// Covers only `(id, proposer_id, created_at)`: the content is not part of it, and
/// there is no secret key, so this authenticates nothing.
pub fn compute_proposal_digest(proposal: &Proposal) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(proposal.id.as_bytes());
    hasher.update([0u8]);
    hasher.update(proposal.proposer_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(proposal.created_at.to_le_bytes());
    hasher.finalize().to_vec()
}

pub fn compute_vote_digest(vote: &Vote) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(vote.proposal_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(vote.voter_id.as_bytes());
    hasher.update([0u8]);
    hasher.update([vote.decision.as_byte()]);
    hasher.update(vote.cast_at.to_le_bytes());
    hasher.update(vote.term.unwrap_or_default().to_le_bytes());
    hasher.finalize().to_vec()
}

pub fn verify_proposal_signature(proposal: &Proposal) -> bool {
    proposal
        .signature
        .as_deref()
        .is_some_and(|signature| signature == compute_proposal_digest(proposal).as_slice())
}

pub fn verify_vote_signature(vote: &Vote) -> Result<(), VoteRejection> {
    let signature = vote
        .signature
        .as_deref()
        .ok_or(VoteRejection::MissingSignature)?;
    if signature != compute_vote_digest(vote).as_slice() {
        return Err(VoteRejection::InvalidSignature);
    }
    Ok(())
}

pub fn validate_timeout(timeout: Duration) -> Result<(), ConsensusError> {
    if timeout.is_zero() {
        return Err(ConsensusError::InvalidTimeout);
    }
    Ok(())
}

pub fn validate_threshold(threshold: f64) -> Result<(), ConsensusError> {
    if !(threshold > 0.0 && threshold <= 1.0) {
        return Err(ConsensusError::ProtocolMisconfigured(format!(
            "threshold must be in (0, 1], got {threshold}"
        )));
    }
    Ok(())
}

/// Simple-majority quorum: `ceil(N/2)`.
pub fn majority_quorum(members: usize) -> usize {
    members.div_ceil(2)
}

/// Tolerated faulty members: `f = floor((N-1)/3)`.
pub fn byzantine_fault_tolerance(members: usize) -> usize {
    members.saturating_sub(1) / 3
}

/// Agreeing votes needed under Byzantine tolerance `f`: `2f+1`.
pub fn byzantine_required_votes(faulty: usize) -> usize {
    2 * faulty + 1
}

/// Votes a gossip proposal needs once converged: `ceil(N × threshold)`.
pub fn gossip_required_votes(members: usize, convergence_threshold: f64) -> usize {
    ((members as f64) * convergence_threshold).ceil() as usize
}

/// Share of the membership backing a decision, clamped to `1.0`.
pub fn confidence(backing: usize, members: usize) -> f64 {
    if members == 0 {
        return 0.0;
    }
    (backing as f64 / members as f64).min(1.0)
}
