use parking_lot::RwLock;
use std::collections::BTreeSet;

use crate::types::AgentId;

/// Known participants, used only to size quorums.
///
/// Reads (quorum lookups) run concurrently; joins and leaves take the write lock.
#[derive(Debug, Default)]
pub struct MembershipRegistry {
    members: RwLock<BTreeSet<AgentId>>,
}

impl MembershipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add members, returning how many were new.
    pub fn add_members<I, A>(&self, ids: I) -> usize
    where
        I: IntoIterator<Item = A>,
        A: Into<AgentId>,
    {
        let mut members = self.members.write();
        ids.into_iter()
            .map(Into::<AgentId>::into)
            .filter(|id| members.insert(id.clone()))
            .count()
    }

    /// Remove members, returning how many were present.
    pub fn remove_members<I, A>(&self, ids: I) -> usize
    where
        I: IntoIterator<Item = A>,
        A: AsRef<str>,
    {
        let mut members = self.members.write();
        ids.into_iter()
            .filter(|id| members.remove(id.as_ref()))
            .count()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.read().contains(id)
    }

    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }

    /// Sorted copy of the current membership.
    pub fn snapshot(&self) -> Vec<AgentId> {
        self.members.read().iter().cloned().collect()
    }
}
