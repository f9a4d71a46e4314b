//! # Mooring State
//!
//! Optimistic local copies of server-owned entities.
//!
//! Each followed entity keeps the last server-acknowledged `origin`, its
//! `version_id`, the local `commits` not yet acknowledged, and a `head` that
//! is origin with those commits applied. Commands in [`updater`], [`queue`]
//! and [`reconcile`] never touch the state directly: they return an
//! [`UpdateOperation`] that [`apply_command`] applies, so local edits, server
//! diffs and conflict resolution all share one patch vocabulary.
//!
//! ```
//! use mooring_assign::{UpdateOperation, Value};
//! use mooring_state::{apply_command, updater, LocalState};
//!
//! let state = LocalState::new();
//! let entity = Value::from(serde_json::json!({ "id": "n1", "title": "draft" }));
//! let state = apply_command(&state, &updater::follow("note", &entity, Some("v1")).unwrap()).unwrap();
//!
//! let edit = UpdateOperation::new().set("title", "final");
//! let state = apply_command(&state, &updater::commit(&state, "note", "n1", &edit).unwrap()).unwrap();
//! assert_eq!(
//!     state.head_entity("note", "n1").unwrap().get("title"),
//!     Some(&Value::from("final"))
//! );
//! ```

pub mod error;
mod finder;
pub mod queue;
pub mod reconcile;
pub mod state;
pub mod updater;

pub use error::{ErrorKind, ErrorSite, LocalError, ReportedError, Result, StateError};
pub use reconcile::{patch, rebase, synchronize, synchronize_from};
pub use state::{
    EntityInfo, EntityMap, LocalState, NetworkState, PushCommand, Session, UnreachedCommit,
    VersionDiff,
};

use mooring_assign::{apply, Op, UpdateOperation};
use std::collections::BTreeSet;

/// Apply a command's operation to the state.
///
/// Fails without producing a partial state. When every path of the operation
/// lies inside single entities, only those entities go through the document
/// form; the rest are carried over as they are.
pub fn apply_command(state: &LocalState, operation: &UpdateOperation) -> Result<LocalState> {
    if operation.is_empty() {
        return Ok(state.clone());
    }
    let Some(touched) = touched_entities(operation) else {
        return Ok(apply(state, operation)?);
    };

    let mut scoped = LocalState {
        entities: EntityMap::new(),
        unreached_commits: state.unreached_commits.clone(),
        network: state.network.clone(),
        session: state.session.clone(),
        error: state.error.clone(),
    };
    for &(name, id) in &touched {
        if let Some(by_id) = state.entities.get(name) {
            let scoped_by_id = scoped.entities.entry(name.to_string()).or_default();
            if let Some(info) = by_id.get(id) {
                scoped_by_id.insert(id.to_string(), info.clone());
            }
        }
    }
    let applied = apply(&scoped, operation)?;

    let mut entities = state.entities.clone();
    for (name, id) in touched {
        match applied.entities.get(name).and_then(|by_id| by_id.get(id)) {
            Some(info) => {
                entities
                    .entry(name.to_string())
                    .or_default()
                    .insert(id.to_string(), info.clone());
            }
            None => {
                if let Some(by_id) = entities.get_mut(name) {
                    by_id.remove(id);
                }
            }
        }
    }
    Ok(LocalState { entities, ..applied })
}

/// Entities the operation writes into, or `None` if it reaches any path
/// above a single entity.
fn touched_entities(operation: &UpdateOperation) -> Option<BTreeSet<(&str, &str)>> {
    let mut touched = BTreeSet::new();
    for op in operation.ops() {
        if matches!(op, Op::Rename(_)) {
            return None;
        }
        for path in op.paths() {
            match path.segments() {
                [root, ..] if root != "entities" => {}
                [_, name, id, ..] => {
                    touched.insert((name.as_str(), id.as_str()));
                }
                _ => return None,
            }
        }
    }
    Some(touched)
}
