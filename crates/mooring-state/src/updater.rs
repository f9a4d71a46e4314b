//! Local state commands.
//!
//! Each command reads the current state and returns the [`UpdateOperation`]
//! that performs it. Nothing here mutates; the caller applies the operation
//! with [`apply_command`](crate::apply_command).

use crate::error::{LocalError, ReportedError, Result, StateError};
use crate::state::{entity_field, entity_path, EntityInfo, LocalState, Session};
use mooring_assign::{apply, apply_all, DocumentPath, Restorable, UpdateOperation, Value};
use std::collections::BTreeMap;

fn entity_id<'a>(entity_name: &str, entity: &'a Value) -> Result<&'a str> {
    entity
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| StateError::MissingId {
            entity_name: entity_name.to_string(),
        })
}

/// Fold `commits` over `origin`, or `Null` when there are none.
pub(crate) fn head_of(origin: &Value, commits: &[UpdateOperation]) -> Result<Value> {
    if commits.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(apply_all(origin, commits)?)
    }
}

/// Reset the entities of one name to an empty mapping.
pub fn initialize(entity_name: &str) -> UpdateOperation {
    UpdateOperation::new().set(
        DocumentPath::from_segments(["entities", entity_name]),
        Value::empty_object(),
    )
}

/// Append a commit and move head forward.
///
/// The commit is stored in document form, so head is computed from that form
/// too and later replays reproduce it.
pub fn commit(
    state: &LocalState,
    entity_name: &str,
    id: &str,
    operation: &UpdateOperation,
) -> Result<UpdateOperation> {
    let stored = operation.to_value();
    let head = apply(
        state.head_entity(entity_name, id)?,
        &UpdateOperation::from_value(&stored)?,
    )?;
    Ok(UpdateOperation::new()
        .push(entity_field(entity_name, id, "commits"), stored)
        .set(entity_field(entity_name, id, "head"), head))
}

/// Drop the first equal commit for each of `operations` and rebuild head.
///
/// Operations with no matching commit are ignored.
pub fn revert(
    state: &LocalState,
    entity_name: &str,
    id: &str,
    operations: &[UpdateOperation],
) -> Result<UpdateOperation> {
    let info = state.entity_info(entity_name, id)?;
    let mut commits = info.commits.clone();
    for operation in operations {
        let operation = UpdateOperation::from_value(&operation.to_value())?;
        if let Some(index) = commits.iter().position(|c| *c == operation) {
            commits.remove(index);
        }
    }
    let head = head_of(&info.origin, &commits)?;
    Ok(UpdateOperation::new()
        .set(
            entity_field(entity_name, id, "commits"),
            Value::array(commits.iter().map(UpdateOperation::to_value)),
        )
        .set(entity_field(entity_name, id, "head"), head))
}

/// Start tracking an entity, replacing any previous entry for its id.
pub fn follow(entity_name: &str, entity: &Value, version_id: Option<&str>) -> Result<UpdateOperation> {
    let id = entity_id(entity_name, entity)?;
    let info = EntityInfo::new(entity.clone(), version_id.map(str::to_string));
    Ok(UpdateOperation::new().set(entity_path(entity_name, id), info.document()))
}

/// Follow several entities in one operation.
pub fn follow_all(
    entity_name: &str,
    entities: &[Value],
    versions_by_id: &BTreeMap<String, String>,
) -> Result<UpdateOperation> {
    entities.iter().try_fold(UpdateOperation::new(), |acc, entity| {
        let id = entity_id(entity_name, entity)?;
        let version_id = versions_by_id.get(id).map(String::as_str);
        Ok(acc.merge(follow(entity_name, entity, version_id)?))
    })
}

/// Stop tracking an entity.
pub fn unfollow(entity_name: &str, id: &str) -> UpdateOperation {
    UpdateOperation::new().unset(entity_path(entity_name, id))
}

/// Record an in-flight request.
pub fn network_request(tag: &str) -> UpdateOperation {
    UpdateOperation::new().push("network.requests", tag)
}

/// Forget the first in-flight request with `tag`.
pub fn remove_network_request(state: &LocalState, tag: &str) -> UpdateOperation {
    let mut requests = state.network.requests.clone();
    if let Some(index) = requests.iter().position(|t| t == tag) {
        requests.remove(index);
    }
    UpdateOperation::new().set(
        "network.requests",
        Value::array(requests.into_iter().map(Value::from)),
    )
}

/// Store the session, following the user entity when one is given with its version.
pub fn set_session(
    session: &Session,
    user: Option<&Value>,
    version_id: Option<&str>,
) -> Result<UpdateOperation> {
    let operation = UpdateOperation::new().set("session", session.to_document()?);
    match (user, version_id) {
        (Some(user), Some(version_id)) => {
            Ok(operation.merge(follow(&session.entity_name, user, Some(version_id))?))
        }
        _ => Ok(operation),
    }
}

pub fn unset_session() -> UpdateOperation {
    UpdateOperation::new().unset("session")
}

pub fn online() -> UpdateOperation {
    UpdateOperation::new().set("network.isOnline", true)
}

pub fn offline() -> UpdateOperation {
    UpdateOperation::new().set("network.isOnline", false)
}

/// Store a failure for display.
///
/// A [`ReportedError`] keeps its type and site; anything else converts into
/// a local internal error through its `Into` impl.
pub fn error(error: impl Into<ReportedError>, action_tag: &str) -> Result<UpdateOperation> {
    let reported = error.into();
    let stored = LocalError {
        kind: reported.kind,
        at: reported.at,
        message: reported.message,
        action_tag: action_tag.to_string(),
    };
    Ok(UpdateOperation::new().set("error", stored.to_document()?))
}

/// Clear the stored failure.
pub fn resolve_error() -> UpdateOperation {
    UpdateOperation::new().unset("error")
}
