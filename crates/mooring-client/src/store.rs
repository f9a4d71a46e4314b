//! The local store: one [`LocalState`] behind a lock, replaced on every action.

use crate::action::Action;
use crate::config::ClientConfig;
use crate::error::Result;
use mooring_state::LocalState;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Events emitted by a [`LocalStore`].
#[derive(Clone, Debug, PartialEq)]
pub enum StoreEvent {
    /// An action produced a new state.
    Changed { action: &'static str },
    /// An action failed; the state was left as it was.
    Rejected { action: &'static str, error: String },
}

/// Holds the current [`LocalState`].
///
/// States are immutable snapshots. A dispatch computes the next state from
/// the current one and swaps it in, so readers holding an earlier snapshot
/// are never affected.
pub struct LocalStore {
    state: RwLock<Arc<LocalState>>,
    event_tx: broadcast::Sender<StoreEvent>,
}

impl LocalStore {
    /// Create a store with each configured entity name initialized.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut state = LocalState::new();
        for entity_name in &config.initial_entities {
            state = Action::Initialize {
                entity_name: entity_name.clone(),
            }
            .reduce(&state)?;
        }
        state.network.is_online = config.start_online;
        Ok(Self::with_state(state, config.event_capacity))
    }

    pub fn with_state(state: LocalState, event_capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(event_capacity.max(1));
        Self {
            state: RwLock::new(Arc::new(state)),
            event_tx,
        }
    }

    /// The current state.
    pub fn snapshot(&self) -> Arc<LocalState> {
        self.state.read().clone()
    }

    /// Apply an action, returning the new state.
    ///
    /// Dispatches are serialized. On failure the current state is kept.
    pub fn dispatch(&self, action: Action) -> Result<Arc<LocalState>> {
        let name = action.name();
        let mut current = self.state.write();
        match action.reduce(&current) {
            Ok(next) => {
                let next = Arc::new(next);
                *current = next.clone();
                drop(current);
                debug!(action = name, "dispatched");
                let _ = self.event_tx.send(StoreEvent::Changed { action: name });
                Ok(next)
            }
            Err(err) => {
                drop(current);
                debug!(action = name, error = %err, "dispatch rejected");
                let _ = self.event_tx.send(StoreEvent::Rejected {
                    action: name,
                    error: err.to_string(),
                });
                Err(err.into())
            }
        }
    }

    /// Subscribe to store events.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.event_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfigBuilder;
    use mooring_assign::{UpdateOperation, Value};
    use serde_json::json;

    #[test]
    fn test_new_initializes_entities() {
        let config = ClientConfigBuilder::new()
            .entity("note")
            .start_online(false)
            .build();
        let store = LocalStore::new(&config).unwrap();
        let state = store.snapshot();
        assert!(state.entities.get("note").is_some_and(|m| m.is_empty()));
        assert!(!state.is_online());
    }

    #[test]
    fn test_dispatch_swaps_snapshot() {
        let store = LocalStore::new(&ClientConfig::default()).unwrap();
        let before = store.snapshot();
        store.dispatch(Action::NetworkRequest("t1".into())).unwrap();

        assert!(!before.is_pending("t1"));
        assert!(store.snapshot().is_pending("t1"));
    }

    #[test]
    fn test_failed_dispatch_keeps_state_and_reports() {
        let store = LocalStore::new(&ClientConfig::default()).unwrap();
        store
            .dispatch(Action::Follow {
                entity_name: "note".into(),
                entity: Value::from(json!({ "id": "n1" })),
                version_id: None,
            })
            .unwrap();
        let mut events = store.subscribe();
        let before = store.snapshot();

        let result = store.dispatch(Action::Commit {
            entity_name: "note".into(),
            id: "n2".into(),
            operation: UpdateOperation::new().set("a", 1),
        });

        assert!(result.is_err());
        assert_eq!(*store.snapshot(), *before);
        assert!(matches!(
            events.try_recv(),
            Ok(StoreEvent::Rejected { action: "mooring/commit", .. })
        ));
    }

    #[test]
    fn test_changed_event_names_action() {
        let store = LocalStore::new(&ClientConfig::default()).unwrap();
        let mut events = store.subscribe();
        store.dispatch(Action::Offline).unwrap();
        assert_eq!(
            events.try_recv().unwrap(),
            StoreEvent::Changed { action: "mooring/offline" }
        );
    }
}
