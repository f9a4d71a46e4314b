//! End-to-end flows between clients and the in-memory server.

use async_trait::async_trait;
use mooring_assign::{UpdateOperation, Value};
use mooring_client::prelude::*;
use mooring_client::{Fetched, LoginCommand, LoginResponse, PushRequest};
use mooring_state::{ErrorKind, PushCommand, UnreachedCommit};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Notify;

fn server() -> Arc<MemoryEntityClient> {
    let server = Arc::new(MemoryEntityClient::new());
    server
        .insert("note", Value::from(json!({ "id": "n1", "count": 0, "tags": [] })))
        .unwrap();
    server
}

fn client<C: EntityClient>(server: Arc<C>, config: ClientConfig) -> SyncManager<C> {
    let store = Arc::new(LocalStore::new(&config).unwrap());
    SyncManager::new(store, server, config)
}

fn default_client(server: &Arc<MemoryEntityClient>) -> SyncManager<MemoryEntityClient> {
    client(server.clone(), ClientConfigBuilder::new().entity("note").build())
}

fn head(sync: &SyncManager<impl EntityClient>) -> Value {
    sync.store()
        .snapshot()
        .head_entity("note", "n1")
        .unwrap()
        .clone()
}

#[tokio::test]
async fn test_two_clients_converge() {
    let server = server();
    let alice = default_client(&server);
    let bob = default_client(&server);
    alice.follow("note", "n1").await.unwrap();
    bob.follow("note", "n1").await.unwrap();
    let mut alice_diffs = server.subscribe();

    let pushed = alice
        .commit_and_push("note", "n1", UpdateOperation::new().inc("count", 1))
        .await
        .unwrap();
    assert_eq!(pushed, PushOutcome::Synced { acknowledged: 1 });

    bob.commit_and_push("note", "n1", UpdateOperation::new().inc("count", 10))
        .await
        .unwrap();

    // Alice's own diff is stale against her acknowledged version; Bob's applies.
    assert_eq!(alice.pump_diffs(&mut alice_diffs).unwrap(), 1);

    let expected = server.entity("note", "n1").unwrap();
    assert_eq!(expected.get("count"), Some(&Value::Int(11)));
    assert_eq!(head(&alice), expected);
    assert_eq!(head(&bob), expected);
    assert!(alice.store().snapshot().network.requests.is_empty());
}

#[tokio::test]
async fn test_duplicated_diffs_apply_once() {
    let server = server();
    let alice = default_client(&server);
    let bob = default_client(&server);
    alice.follow("note", "n1").await.unwrap();
    bob.follow("note", "n1").await.unwrap();
    let mut diffs = server.subscribe();

    bob.commit_and_push("note", "n1", UpdateOperation::new().push("tags", "b"))
        .await
        .unwrap();
    let diff = diffs.try_recv().unwrap();

    assert!(alice.apply_version_diff(diff.clone()).unwrap());
    assert!(!alice.apply_version_diff(diff).unwrap());
    assert_eq!(head(&alice).get("tags"), Some(&Value::from(vec![Value::from("b")])));
}

#[tokio::test]
async fn test_offline_commits_are_repushed() {
    let server = server();
    let alice = default_client(&server);
    alice.follow("note", "n1").await.unwrap();

    server.set_reachable(false);
    let first = alice
        .commit_and_push("note", "n1", UpdateOperation::new().inc("count", 1))
        .await
        .unwrap();
    assert_eq!(first, PushOutcome::Queued { pending: 1 });
    assert!(!alice.store().snapshot().is_online());

    let second = alice
        .commit_and_push("note", "n1", UpdateOperation::new().inc("count", 2))
        .await
        .unwrap();
    assert_eq!(second, PushOutcome::Queued { pending: 2 });
    assert_eq!(alice.store().snapshot().enqueued_commit_count("note", "n1"), 2);

    server.set_reachable(true);
    let outcomes = alice.go_online().await.unwrap();
    assert_eq!(outcomes, vec![PushOutcome::Synced { acknowledged: 2 }]);

    let state = alice.store().snapshot();
    assert!(state.unreached_commits.is_empty());
    assert!(!state.entity_info("note", "n1").unwrap().is_dirty());
    assert_eq!(
        server.entity("note", "n1").unwrap().get("count"),
        Some(&Value::Int(3))
    );
}

#[tokio::test]
async fn test_rejected_push_stores_error() {
    let server = server();
    let alice = default_client(&server);
    alice.follow("note", "n1").await.unwrap();
    server.delete("note", "n1").await.unwrap();

    let err = alice
        .commit_and_push("note", "n1", UpdateOperation::new().inc("count", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Remote(RemoteError::Rejected(_))));

    let state = alice.store().snapshot();
    let stored = state.error.as_ref().unwrap();
    assert_eq!(stored.kind, ErrorKind::NotFound);
    assert!(state.network.requests.is_empty());
    assert!(state.is_online());
    assert!(state.unreached_commits.is_empty());
    assert!(state.entity_info("note", "n1").unwrap().is_dirty());
}

#[tokio::test]
async fn test_pull_rebases_local_commits() {
    let server = server();
    let alice = default_client(&server);
    let bob = default_client(&server);
    alice.follow("note", "n1").await.unwrap();
    bob.follow("note", "n1").await.unwrap();

    alice
        .commit("note", "n1", UpdateOperation::new().push("tags", "a"))
        .unwrap();
    bob.commit_and_push("note", "n1", UpdateOperation::new().set("title", "bob"))
        .await
        .unwrap();

    alice.pull("note", "n1").await.unwrap();
    let state = alice.store().snapshot();
    let info = state.entity_info("note", "n1").unwrap();
    assert_eq!(info.origin.get("title"), Some(&Value::from("bob")));
    assert_eq!(info.version_id, server.version("note", "n1"));
    assert_eq!(head(&alice).get("tags"), Some(&Value::from(vec![Value::from("a")])));
    assert_eq!(head(&alice).get("title"), Some(&Value::from("bob")));
}

#[tokio::test]
async fn test_push_batch_is_capped() {
    let server = server();
    let alice = client(
        server.clone(),
        ClientConfigBuilder::new().entity("note").max_push_batch(1).build(),
    );
    alice.follow("note", "n1").await.unwrap();
    alice.commit("note", "n1", UpdateOperation::new().inc("count", 1)).unwrap();
    alice.commit("note", "n1", UpdateOperation::new().inc("count", 2)).unwrap();

    assert_eq!(
        alice.push("note", "n1").await.unwrap(),
        PushOutcome::Synced { acknowledged: 1 }
    );
    let state = alice.store().snapshot();
    assert_eq!(state.entity_info("note", "n1").unwrap().commits.len(), 1);
    assert_eq!(head(&alice).get("count"), Some(&Value::Int(3)));
    assert_eq!(
        server.entity("note", "n1").unwrap().get("count"),
        Some(&Value::Int(1))
    );
}

#[tokio::test]
async fn test_repush_drops_unfollowed_entities() {
    let server = server();
    let alice = default_client(&server);
    alice
        .store()
        .dispatch(Action::AddUnreachedCommits(UnreachedCommit::new("note", "gone", 2)))
        .unwrap();

    assert!(alice.repush().await.unwrap().is_empty());
    assert!(alice.store().snapshot().unreached_commits.is_empty());
}

#[tokio::test]
async fn test_login_follows_user_and_logout_unfollows() {
    let server = server();
    server
        .register("user", Value::from(json!({ "id": "alice", "name": "Alice" })), "pw")
        .unwrap();
    let alice = client(
        server.clone(),
        ClientConfigBuilder::new().entity("user").build(),
    );

    let err = alice.login("user", "alice", "nope").await.unwrap_err();
    assert!(matches!(err, ClientError::Remote(RemoteError::Rejected(_))));
    assert_eq!(
        alice.store().snapshot().error.as_ref().map(|e| e.kind),
        Some(ErrorKind::Unauthorized)
    );
    alice.store().dispatch(Action::ResolveError).unwrap();

    alice.login("user", "alice", "pw").await.unwrap();
    let state = alice.store().snapshot();
    assert_eq!(
        state.session.as_ref().and_then(|s| s.user_id.as_deref()),
        Some("alice")
    );
    assert!(state.has_entity("user", "alice"));
    assert!(state.error.is_none());

    alice.logout().await.unwrap();
    let state = alice.store().snapshot();
    assert!(state.session.is_none());
    assert!(!state.has_entity("user", "alice"));
}

#[tokio::test]
async fn test_delete_unfollows() {
    let server = server();
    let alice = default_client(&server);
    alice.follow("note", "n1").await.unwrap();
    alice.delete("note", "n1").await.unwrap();
    assert!(!alice.store().snapshot().has_entity("note", "n1"));
    assert!(server.entity("note", "n1").is_none());
}

#[tokio::test]
async fn test_follow_while_unreachable_goes_offline() {
    let server = server();
    let alice = default_client(&server);
    server.set_reachable(false);

    let err = alice.follow("note", "n1").await.unwrap_err();
    assert!(matches!(err, ClientError::Remote(RemoteError::Network(_))));
    let state = alice.store().snapshot();
    assert!(!state.is_online());
    assert!(state.error.is_none());
}

/// Holds every push until released.
struct GatedClient {
    inner: Arc<MemoryEntityClient>,
    gate: Notify,
}

#[async_trait]
impl EntityClient for GatedClient {
    async fn get(&self, entity_name: &str, id: &str) -> Result<Fetched, RemoteError> {
        self.inner.get(entity_name, id).await
    }

    async fn push(&self, request: PushRequest) -> Result<PushCommand, RemoteError> {
        self.gate.notified().await;
        self.inner.push(request).await
    }

    async fn pull(
        &self,
        entity_name: &str,
        id: &str,
        version_id: &str,
    ) -> Result<PushCommand, RemoteError> {
        self.inner.pull(entity_name, id, version_id).await
    }

    async fn login(&self, command: LoginCommand) -> Result<LoginResponse, RemoteError> {
        self.inner.login(command).await
    }

    async fn logout(&self, session_id: &str) -> Result<(), RemoteError> {
        self.inner.logout(session_id).await
    }

    async fn delete(&self, entity_name: &str, id: &str) -> Result<(), RemoteError> {
        self.inner.delete(entity_name, id).await
    }
}

#[tokio::test]
async fn test_response_to_cancelled_request_is_ignored() {
    let (gated, alice) = gated_client();
    alice.follow("note", "n1").await.unwrap();
    alice.commit("note", "n1", UpdateOperation::new().inc("count", 1)).unwrap();

    let pushing = {
        let alice = alice.clone();
        tokio::spawn(async move { alice.push("note", "n1").await })
    };
    until_request_pending(&alice).await;

    assert_eq!(alice.cancel_pending().unwrap(), 1);
    gated.gate.notify_one();
    let outcome = pushing.await.unwrap().unwrap();

    assert_eq!(outcome, PushOutcome::Ignored);
    let state = alice.store().snapshot();
    assert!(state.entity_info("note", "n1").unwrap().is_dirty());
    assert!(state.network.requests.is_empty());
}

fn gated_client() -> (Arc<GatedClient>, Arc<SyncManager<GatedClient>>) {
    let gated = Arc::new(GatedClient {
        inner: server(),
        gate: Notify::new(),
    });
    let alice = Arc::new(client(
        gated.clone(),
        ClientConfigBuilder::new().entity("note").build(),
    ));
    (gated, alice)
}

async fn until_request_pending(sync: &SyncManager<GatedClient>) {
    while sync.store().snapshot().network.requests.is_empty() {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_overlapping_push_does_not_resend() {
    let (gated, alice) = gated_client();
    alice.follow("note", "n1").await.unwrap();
    alice.commit("note", "n1", UpdateOperation::new().inc("count", 1)).unwrap();

    let first = {
        let alice = alice.clone();
        tokio::spawn(async move { alice.push("note", "n1").await })
    };
    until_request_pending(&alice).await;
    assert_eq!(alice.store().snapshot().enqueued_commit_count("note", "n1"), 1);

    let second = alice.push("note", "n1").await.unwrap();
    assert_eq!(second, PushOutcome::InFlight);
    assert_eq!(alice.store().snapshot().network.requests.len(), 1);

    gated.gate.notify_one();
    assert_eq!(
        first.await.unwrap().unwrap(),
        PushOutcome::Synced { acknowledged: 1 }
    );

    let expected = gated.inner.entity("note", "n1").unwrap();
    assert_eq!(expected.get("count"), Some(&Value::Int(1)));
    assert_eq!(head(&alice), expected);
    let state = alice.store().snapshot();
    assert!(!state.entity_info("note", "n1").unwrap().is_dirty());
    assert!(state.unreached_commits.is_empty());
    assert_eq!(alice.push("note", "n1").await.unwrap(), PushOutcome::Clean);
}

#[tokio::test]
async fn test_diff_patched_during_push_is_not_applied_twice() {
    let (gated, alice) = gated_client();
    let bob = default_client(&gated.inner);
    alice.follow("note", "n1").await.unwrap();
    bob.follow("note", "n1").await.unwrap();
    let mut alice_diffs = gated.inner.subscribe();
    alice.commit("note", "n1", UpdateOperation::new().inc("count", 1)).unwrap();

    let pushing = {
        let alice = alice.clone();
        tokio::spawn(async move { alice.push("note", "n1").await })
    };
    until_request_pending(&alice).await;

    bob.commit_and_push("note", "n1", UpdateOperation::new().inc("count", 10))
        .await
        .unwrap();
    assert_eq!(alice.pump_diffs(&mut alice_diffs).unwrap(), 1);

    gated.gate.notify_one();
    assert_eq!(
        pushing.await.unwrap().unwrap(),
        PushOutcome::Synced { acknowledged: 1 }
    );

    let expected = gated.inner.entity("note", "n1").unwrap();
    assert_eq!(expected.get("count"), Some(&Value::Int(11)));
    assert_eq!(head(&alice), expected);
    let state = alice.store().snapshot();
    let info = state.entity_info("note", "n1").unwrap();
    assert_eq!(info.version_id, gated.inner.version("note", "n1"));
    assert!(!info.is_dirty());
}
