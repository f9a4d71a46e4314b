//! Reconciling local commits with server versions.
//!
//! An entity is clean when it has no commits and dirty otherwise. `patch`
//! takes a single version-gated diff, `rebase` replays the server log under
//! the local commits, and `synchronize` also retires the commits the server
//! has just acknowledged.

use crate::error::Result;
use crate::state::{entity_field, entity_path, EntityInfo, LocalState, PushCommand, VersionDiff};
use crate::updater::head_of;
use mooring_assign::{apply, apply_all, UpdateOperation, Value};
use tracing::{debug, warn};

/// Apply a server diff to origin if it was made against the stored version.
///
/// A stale diff yields an empty operation.
pub fn patch(state: &LocalState, diff: &VersionDiff) -> Result<UpdateOperation> {
    let info = state.entity_info(&diff.entity_name, &diff.id)?;
    if info.version_id.as_deref() != Some(diff.prev_version_id.as_str()) {
        debug!(
            entity_name = %diff.entity_name,
            id = %diff.id,
            stored = ?info.version_id,
            prev_version_id = %diff.prev_version_id,
            "discarding stale version diff"
        );
        return Ok(UpdateOperation::new());
    }

    let origin = apply(&info.origin, &diff.operation)?;
    let head = head_of(&origin, &info.commits)?;
    Ok(set_versioned(
        &diff.entity_name,
        &diff.id,
        origin,
        &diff.version_id,
        head,
    ))
}

/// Replay the server's operations onto origin, then local commits onto that.
pub fn rebase(state: &LocalState, command: &PushCommand) -> Result<UpdateOperation> {
    let info = state.entity_info(&command.entity_name, &command.id)?;
    let origin = apply_all(&info.origin, &command.operations)?;
    let head = head_of(&origin, &info.commits)?;
    Ok(set_versioned(
        &command.entity_name,
        &command.id,
        origin,
        &command.version_id,
        head,
    ))
}

/// Rebase, folding the acknowledged `local_commits` into origin and
/// dropping that many commits from the front of the log.
///
/// `local_commits` is expected to be a prefix of the stored commits. When it
/// is not, a warning is logged and the first `local_commits.len()` commits
/// are still dropped.
pub fn synchronize(
    state: &LocalState,
    command: &PushCommand,
    local_commits: &[UpdateOperation],
) -> Result<UpdateOperation> {
    let info = state.entity_info(&command.entity_name, &command.id)?;
    synchronize_from(state, command, &info.origin, local_commits)
}

/// `synchronize` against the origin the push was made from.
///
/// Used when the stored version moved while the push was in flight, so the
/// server's operations are relative to `origin` rather than the stored one.
pub fn synchronize_from(
    state: &LocalState,
    command: &PushCommand,
    origin: &Value,
    local_commits: &[UpdateOperation],
) -> Result<UpdateOperation> {
    let info = state.entity_info(&command.entity_name, &command.id)?;
    if !info.commits.starts_with(local_commits) {
        warn!(
            entity_name = %command.entity_name,
            id = %command.id,
            acknowledged = local_commits.len(),
            pending = info.commits.len(),
            "acknowledged commits are not a prefix of the local commits"
        );
    }

    let origin = apply_all(origin, command.operations.iter().chain(local_commits))?;
    let commits: Vec<UpdateOperation> = info
        .commits
        .iter()
        .skip(local_commits.len())
        .cloned()
        .collect();
    let head = head_of(&origin, &commits)?;

    let synced = EntityInfo {
        origin,
        version_id: Some(command.version_id.clone()),
        commits,
        head: if head.is_null() { None } else { Some(head) },
    };
    Ok(UpdateOperation::new().set(
        entity_path(&command.entity_name, &command.id),
        synced.document(),
    ))
}

fn set_versioned(
    entity_name: &str,
    id: &str,
    origin: Value,
    version_id: &str,
    head: Value,
) -> UpdateOperation {
    UpdateOperation::new()
        .set(entity_field(entity_name, id, "origin"), origin)
        .set(entity_field(entity_name, id, "versionId"), version_id)
        .set(entity_field(entity_name, id, "head"), head)
}
