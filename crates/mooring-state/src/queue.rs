//! Bookkeeping for commits in flight to the server.
//!
//! Overlapping push attempts for one entity must not enqueue the same commits
//! twice, so additions only cover the commits not already tracked.

use crate::state::{LocalState, UnreachedCommit};
use mooring_assign::{Condition, UpdateOperation};

/// Enqueue the part of `commit` not already tracked for its entity.
pub fn add_unreached_commits(state: &LocalState, commit: &UnreachedCommit) -> UpdateOperation {
    let enqueued = state.enqueued_commit_count(&commit.entity_name, &commit.id);
    if commit.commit_count <= enqueued {
        return UpdateOperation::new();
    }
    let entry = UnreachedCommit {
        commit_count: commit.commit_count - enqueued,
        ..commit.clone()
    };
    UpdateOperation::new().push("unreachedCommits", entry.document())
}

/// Remove entries equal to `commit`.
pub fn remove_unreached_commits(commit: &UnreachedCommit) -> UpdateOperation {
    UpdateOperation::new().pull_where("unreachedCommits", Condition::In(vec![commit.document()]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply_command;

    fn total(state: &LocalState) -> u64 {
        state.unreached_commits.iter().map(|c| c.commit_count).sum()
    }

    #[test]
    fn test_duplicate_add_is_deduplicated() {
        let commit = UnreachedCommit::new("e", "1", 3);
        let state = LocalState::new();
        let state = apply_command(&state, &add_unreached_commits(&state, &commit)).unwrap();
        let state = apply_command(&state, &add_unreached_commits(&state, &commit)).unwrap();
        assert_eq!(total(&state), 3);
        assert_eq!(state.unreached_commits.len(), 1);
    }

    #[test]
    fn test_larger_add_enqueues_the_difference() {
        let state = LocalState::new();
        let state = apply_command(&state, &add_unreached_commits(&state, &UnreachedCommit::new("e", "1", 2))).unwrap();
        let state = apply_command(&state, &add_unreached_commits(&state, &UnreachedCommit::new("e", "1", 5))).unwrap();
        assert_eq!(
            state.unreached_commits,
            vec![UnreachedCommit::new("e", "1", 2), UnreachedCommit::new("e", "1", 3)]
        );
    }

    #[test]
    fn test_other_entities_do_not_count() {
        let state = LocalState::new();
        let state = apply_command(&state, &add_unreached_commits(&state, &UnreachedCommit::new("e", "1", 2))).unwrap();
        let state = apply_command(&state, &add_unreached_commits(&state, &UnreachedCommit::new("e", "2", 2))).unwrap();
        assert_eq!(total(&state), 4);
    }

    #[test]
    fn test_remove_exact_match_only() {
        let state = LocalState::new();
        let state = apply_command(&state, &add_unreached_commits(&state, &UnreachedCommit::new("e", "1", 2))).unwrap();
        let state = apply_command(&state, &add_unreached_commits(&state, &UnreachedCommit::new("e", "2", 4))).unwrap();

        let state = apply_command(&state, &remove_unreached_commits(&UnreachedCommit::new("e", "1", 1))).unwrap();
        assert_eq!(state.unreached_commits.len(), 2);

        let state = apply_command(&state, &remove_unreached_commits(&UnreachedCommit::new("e", "1", 2))).unwrap();
        assert_eq!(state.unreached_commits, vec![UnreachedCommit::new("e", "2", 4)]);
    }
}
