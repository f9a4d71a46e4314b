//! Read-only queries over a `LocalState` snapshot.

use crate::error::{Result, StateError};
use crate::state::{EntityInfo, LocalState, VersionDiff};
use mooring_assign::Value;

impl LocalState {
    pub fn has_entity(&self, entity_name: &str, id: &str) -> bool {
        self.entities
            .get(entity_name)
            .map_or(false, |by_id| by_id.contains_key(id))
    }

    /// The entity's info, or `NotFound` if it is not followed.
    pub fn entity_info(&self, entity_name: &str, id: &str) -> Result<&EntityInfo> {
        self.entities
            .get(entity_name)
            .and_then(|by_id| by_id.get(id))
            .ok_or_else(|| StateError::not_found(entity_name, id))
    }

    /// Head if the entity has local commits, else origin.
    pub fn head_entity(&self, entity_name: &str, id: &str) -> Result<&Value> {
        self.entity_info(entity_name, id).map(EntityInfo::current)
    }

    /// Commits of the entity already queued as in flight.
    pub fn enqueued_commit_count(&self, entity_name: &str, id: &str) -> u64 {
        self.unreached_commits
            .iter()
            .filter(|c| c.entity_name == entity_name && c.id == id)
            .map(|c| c.commit_count)
            .sum()
    }

    pub fn is_online(&self) -> bool {
        self.network.is_online
    }

    /// Whether a request with this tag is still awaited.
    pub fn is_pending(&self, tag: &str) -> bool {
        self.network.requests.iter().any(|t| t == tag)
    }

    /// Whether the diff no longer applies to the stored version.
    pub fn is_stale(&self, diff: &VersionDiff) -> Result<bool> {
        let info = self.entity_info(&diff.entity_name, &diff.id)?;
        Ok(info.version_id.as_deref() != Some(diff.prev_version_id.as_str()))
    }
}
