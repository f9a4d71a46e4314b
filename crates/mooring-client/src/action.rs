//! Actions dispatched to the [`LocalStore`](crate::LocalStore).
//!
//! Every action but `Replace`, `Reset` and `Assign` is a state command: it
//! computes an [`UpdateOperation`] from the current state and the store
//! applies it.

use mooring_assign::{apply_all, UpdateOperation, Value};
use mooring_state::{
    apply_command, patch, queue, rebase, synchronize, synchronize_from, updater, LocalState,
    PushCommand, ReportedError, Result, Session, UnreachedCommit, VersionDiff,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A change to the local state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Action {
    /// Swap in a whole new state.
    Replace(LocalState),
    /// Return to the empty state.
    Reset,
    /// Apply raw operations in order.
    Assign(Vec<UpdateOperation>),
    #[serde(rename_all = "camelCase")]
    Initialize { entity_name: String },
    #[serde(rename_all = "camelCase")]
    Commit {
        entity_name: String,
        id: String,
        operation: UpdateOperation,
    },
    #[serde(rename_all = "camelCase")]
    Revert {
        entity_name: String,
        id: String,
        operations: Vec<UpdateOperation>,
    },
    #[serde(rename_all = "camelCase")]
    Follow {
        entity_name: String,
        entity: Value,
        version_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    FollowAll {
        entity_name: String,
        entities: Vec<Value>,
        versions_by_id: BTreeMap<String, String>,
    },
    #[serde(rename_all = "camelCase")]
    Unfollow { entity_name: String, id: String },
    AddUnreachedCommits(UnreachedCommit),
    RemoveUnreachedCommits(UnreachedCommit),
    NetworkRequest(String),
    RemoveNetworkRequest(String),
    #[serde(rename_all = "camelCase")]
    SetSession {
        session: Session,
        user: Option<Value>,
        version_id: Option<String>,
    },
    UnsetSession,
    Online,
    Offline,
    #[serde(rename_all = "camelCase")]
    Error {
        error: ReportedError,
        action_tag: String,
    },
    ResolveError,
    Patch(VersionDiff),
    Rebase(PushCommand),
    #[serde(rename_all = "camelCase")]
    Synchronize {
        command: PushCommand,
        local_commits: Vec<UpdateOperation>,
    },
    /// `Synchronize` for a push whose entity moved to another version while
    /// the request was in flight. `origin` is the origin the push was made from.
    #[serde(rename_all = "camelCase")]
    SynchronizeFrom {
        command: PushCommand,
        origin: Value,
        local_commits: Vec<UpdateOperation>,
    },
}

impl Action {
    /// Name used in logs and store events.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Replace(_) => "mooring/replace",
            Action::Reset => "mooring/reset",
            Action::Assign(_) => "mooring/assign",
            Action::Initialize { .. } => "mooring/initialize",
            Action::Commit { .. } => "mooring/commit",
            Action::Revert { .. } => "mooring/revert",
            Action::Follow { .. } => "mooring/follow",
            Action::FollowAll { .. } => "mooring/followAll",
            Action::Unfollow { .. } => "mooring/unfollow",
            Action::AddUnreachedCommits(_) => "mooring/addUnreachedCommits",
            Action::RemoveUnreachedCommits(_) => "mooring/removeUnreachedCommits",
            Action::NetworkRequest(_) => "mooring/networkRequest",
            Action::RemoveNetworkRequest(_) => "mooring/removeNetworkRequest",
            Action::SetSession { .. } => "mooring/setSession",
            Action::UnsetSession => "mooring/unsetSession",
            Action::Online => "mooring/online",
            Action::Offline => "mooring/offline",
            Action::Error { .. } => "mooring/error",
            Action::ResolveError => "mooring/resolveError",
            Action::Patch(_) => "mooring/patch",
            Action::Rebase(_) => "mooring/rebase",
            Action::Synchronize { .. } => "mooring/synchronize",
            Action::SynchronizeFrom { .. } => "mooring/synchronize",
        }
    }

    /// The operation a command action performs on `state`.
    ///
    /// `Replace`, `Reset` and `Assign` are not commands and yield an empty
    /// operation; use [`Action::reduce`] for those.
    pub fn operation(&self, state: &LocalState) -> Result<UpdateOperation> {
        match self {
            Action::Replace(_) | Action::Reset | Action::Assign(_) => Ok(UpdateOperation::new()),
            Action::Initialize { entity_name } => Ok(updater::initialize(entity_name)),
            Action::Commit {
                entity_name,
                id,
                operation,
            } => updater::commit(state, entity_name, id, operation),
            Action::Revert {
                entity_name,
                id,
                operations,
            } => updater::revert(state, entity_name, id, operations),
            Action::Follow {
                entity_name,
                entity,
                version_id,
            } => updater::follow(entity_name, entity, version_id.as_deref()),
            Action::FollowAll {
                entity_name,
                entities,
                versions_by_id,
            } => updater::follow_all(entity_name, entities, versions_by_id),
            Action::Unfollow { entity_name, id } => Ok(updater::unfollow(entity_name, id)),
            Action::AddUnreachedCommits(commit) => Ok(queue::add_unreached_commits(state, commit)),
            Action::RemoveUnreachedCommits(commit) => Ok(queue::remove_unreached_commits(commit)),
            Action::NetworkRequest(tag) => Ok(updater::network_request(tag)),
            Action::RemoveNetworkRequest(tag) => Ok(updater::remove_network_request(state, tag)),
            Action::SetSession {
                session,
                user,
                version_id,
            } => updater::set_session(session, user.as_ref(), version_id.as_deref()),
            Action::UnsetSession => Ok(updater::unset_session()),
            Action::Online => Ok(updater::online()),
            Action::Offline => Ok(updater::offline()),
            Action::Error { error, action_tag } => updater::error(error.clone(), action_tag),
            Action::ResolveError => Ok(updater::resolve_error()),
            Action::Patch(diff) => patch(state, diff),
            Action::Rebase(command) => rebase(state, command),
            Action::Synchronize {
                command,
                local_commits,
            } => synchronize(state, command, local_commits),
            Action::SynchronizeFrom {
                command,
                origin,
                local_commits,
            } => synchronize_from(state, command, origin, local_commits),
        }
    }

    /// Compute the state after this action. The input is never modified.
    pub fn reduce(&self, state: &LocalState) -> Result<LocalState> {
        match self {
            Action::Replace(next) => Ok(next.clone()),
            Action::Reset => Ok(LocalState::new()),
            Action::Assign(operations) => Ok(apply_all(state, operations)?),
            command => apply_command(state, &command.operation(state)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn followed() -> LocalState {
        Action::Follow {
            entity_name: "note".into(),
            entity: Value::from(json!({ "id": "n1", "count": 0 })),
            version_id: Some("v1".into()),
        }
        .reduce(&LocalState::new())
        .unwrap()
    }

    #[test]
    fn test_commit_moves_head() {
        let state = Action::Commit {
            entity_name: "note".into(),
            id: "n1".into(),
            operation: UpdateOperation::new().inc("count", 2),
        }
        .reduce(&followed())
        .unwrap();
        assert_eq!(
            state.head_entity("note", "n1").unwrap().get("count"),
            Some(&Value::Int(2))
        );
    }

    #[test]
    fn test_assign_applies_raw_operations() {
        let state = Action::Assign(vec![
            UpdateOperation::new().set("network.isOnline", false),
            UpdateOperation::new().push("network.requests", "t1"),
        ])
        .reduce(&LocalState::new())
        .unwrap();
        assert!(!state.is_online());
        assert!(state.is_pending("t1"));
    }

    #[test]
    fn test_reset_and_replace() {
        let state = followed();
        assert_eq!(Action::Reset.reduce(&state).unwrap(), LocalState::new());
        assert_eq!(
            Action::Replace(state.clone()).reduce(&LocalState::new()).unwrap(),
            state
        );
    }

    #[test]
    fn test_failed_command_leaves_input_untouched() {
        let state = followed();
        let result = Action::Commit {
            entity_name: "note".into(),
            id: "missing".into(),
            operation: UpdateOperation::new().inc("count", 1),
        }
        .reduce(&state);
        assert!(result.is_err());
        assert_eq!(state, followed());
    }

    #[test]
    fn test_wire_shape() {
        let action = Action::NetworkRequest("t1".into());
        assert_eq!(
            serde_json::to_value(&action).unwrap(),
            json!({ "type": "networkRequest", "payload": "t1" })
        );
        let back: Action = serde_json::from_value(json!({ "type": "online" })).unwrap();
        assert_eq!(back, Action::Online);
    }
}
