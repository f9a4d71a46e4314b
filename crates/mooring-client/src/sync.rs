//! Orchestration of round trips between the local store and the server.
//!
//! Every call to the [`EntityClient`] is bracketed by a `networkRequest` /
//! `removeNetworkRequest` pair. A response whose request was cancelled in the
//! meantime is dropped. Unreachable servers leave the commits queued and the
//! store offline; [`SyncManager::repush`] sends them once connectivity is back.
//!
//! At most one push per entity is in flight. Its commits are recorded in the
//! unreached-commit queue before the request goes out and retired when the
//! server answers. A response that arrives after the entity moved to another
//! version is settled against the origin the push was made from.

use crate::action::Action;
use crate::config::ClientConfig;
use crate::error::{ClientError, RemoteError, Result};
use crate::remote::{EntityClient, LoginCommand, PushRequest};
use crate::store::LocalStore;
use mooring_assign::UpdateOperation;
use mooring_state::{UnreachedCommit, VersionDiff};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, warn};
use ulid::Ulid;

/// Result of a push attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    /// No commits to send.
    Clean,
    /// The server acknowledged this many commits.
    Synced { acknowledged: usize },
    /// The server was not reached; the commits wait for repush.
    Queued { pending: usize },
    /// The request was cancelled before the response arrived.
    Ignored,
    /// Another push of the entity is in flight; nothing was sent.
    InFlight,
}

type EntityKey = (String, String);

/// Marks an entity as having a push in flight until dropped.
struct InFlight<'a> {
    entities: &'a Mutex<HashSet<EntityKey>>,
    key: EntityKey,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.entities.lock().remove(&self.key);
    }
}

/// Drives a [`LocalStore`] against an [`EntityClient`].
pub struct SyncManager<C: EntityClient> {
    store: Arc<LocalStore>,
    client: Arc<C>,
    config: ClientConfig,
    in_flight: Mutex<HashSet<EntityKey>>,
}

impl<C: EntityClient> SyncManager<C> {
    pub fn new(store: Arc<LocalStore>, client: Arc<C>, config: ClientConfig) -> Self {
        Self {
            store,
            client,
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Fetch an entity and start following it.
    pub async fn follow(&self, entity_name: &str, id: &str) -> Result<()> {
        let tag = self.begin()?;
        let result = self.client.get(entity_name, id).await;
        if !self.finish(&tag)? {
            return Ok(());
        }
        match result {
            Ok(fetched) => {
                self.store.dispatch(Action::Follow {
                    entity_name: entity_name.to_string(),
                    entity: fetched.entity,
                    version_id: Some(fetched.version_id),
                })?;
                Ok(())
            }
            Err(err) => self.fail(&tag, err),
        }
    }

    /// Record a local commit.
    pub fn commit(&self, entity_name: &str, id: &str, operation: UpdateOperation) -> Result<()> {
        self.store.dispatch(Action::Commit {
            entity_name: entity_name.to_string(),
            id: id.to_string(),
            operation,
        })?;
        Ok(())
    }

    pub async fn commit_and_push(
        &self,
        entity_name: &str,
        id: &str,
        operation: UpdateOperation,
    ) -> Result<PushOutcome> {
        self.commit(entity_name, id, operation)?;
        self.push(entity_name, id).await
    }

    /// Send the entity's pending commits, at most `max_push_batch` of them.
    pub async fn push(&self, entity_name: &str, id: &str) -> Result<PushOutcome> {
        self.push_until(entity_name, id, self.config.max_push_batch)
            .await
    }

    async fn push_until(
        &self,
        entity_name: &str,
        id: &str,
        limit: Option<usize>,
    ) -> Result<PushOutcome> {
        let Some(_in_flight) = self.claim(entity_name, id) else {
            debug!(entity_name, id, "push already in flight");
            return Ok(PushOutcome::InFlight);
        };

        let state = self.store.snapshot();
        let info = state.entity_info(entity_name, id)?;
        let count = limit.map_or(info.commits.len(), |n| n.min(info.commits.len()));
        if count == 0 {
            return Ok(PushOutcome::Clean);
        }
        let local_commits = info.commits[..count].to_vec();
        let origin = info.origin.clone();
        let version_id = info.version_id.clone();

        self.store.dispatch(Action::AddUnreachedCommits(UnreachedCommit::new(
            entity_name,
            id,
            count as u64,
        )))?;
        if !state.is_online() {
            return Ok(PushOutcome::Queued { pending: count });
        }
        drop(state);

        let tag = self.begin()?;
        let result = self
            .client
            .push(PushRequest {
                entity_name: entity_name.to_string(),
                id: id.to_string(),
                version_id: version_id.clone(),
                operations: local_commits.clone(),
            })
            .await;
        if !self.finish(&tag)? {
            return Ok(PushOutcome::Ignored);
        }

        match result {
            Ok(command) => {
                info!(
                    entity_name,
                    id,
                    acknowledged = count,
                    foreign = command.operations.len(),
                    version_id = %command.version_id,
                    "push acknowledged"
                );
                let moved = self
                    .store
                    .snapshot()
                    .entity_info(entity_name, id)?
                    .version_id
                    != version_id;
                if moved {
                    debug!(entity_name, id, "entity moved while the push was in flight");
                    self.store.dispatch(Action::SynchronizeFrom {
                        command,
                        origin,
                        local_commits,
                    })?;
                } else {
                    self.store.dispatch(Action::Synchronize {
                        command,
                        local_commits,
                    })?;
                }
                self.retire_queued(entity_name, id, count as u64)?;
                if moved {
                    // Diffs newer than the push may already have been patched in.
                    if let Err(err) = self.pull(entity_name, id).await {
                        warn!(entity_name, id, error = %err, "catch-up pull failed");
                    }
                }
                Ok(PushOutcome::Synced {
                    acknowledged: count,
                })
            }
            Err(err) if err.is_network() => {
                self.record_failure(&tag, &err)?;
                Ok(PushOutcome::Queued { pending: count })
            }
            Err(err) => {
                self.retire_queued(entity_name, id, count as u64)?;
                self.fail(&tag, err)
            }
        }
    }

    /// Push every entity with queued commits, stopping if the server drops again.
    pub async fn repush(&self) -> Result<Vec<PushOutcome>> {
        let state = self.store.snapshot();
        let mut pending: Vec<(String, String, u64)> = Vec::new();
        for entry in &state.unreached_commits {
            match pending
                .iter_mut()
                .find(|(name, id, _)| *name == entry.entity_name && *id == entry.id)
            {
                Some((_, _, count)) => *count += entry.commit_count,
                None => pending.push((entry.entity_name.clone(), entry.id.clone(), entry.commit_count)),
            }
        }
        drop(state);

        let mut outcomes = Vec::with_capacity(pending.len());
        for (entity_name, id, count) in pending {
            if !self.store.snapshot().has_entity(&entity_name, &id) {
                debug!(%entity_name, %id, "dropping queued commits of unfollowed entity");
                self.retire_queued(&entity_name, &id, count)?;
                continue;
            }
            let outcome = self
                .push_until(&entity_name, &id, Some(count as usize))
                .await?;
            if outcome == PushOutcome::Clean {
                self.retire_queued(&entity_name, &id, count)?;
            }
            let stop = matches!(outcome, PushOutcome::Queued { .. });
            outcomes.push(outcome);
            if stop {
                break;
            }
        }
        Ok(outcomes)
    }

    /// Go online and repush.
    pub async fn go_online(&self) -> Result<Vec<PushOutcome>> {
        self.store.dispatch(Action::Online)?;
        self.repush().await
    }

    pub fn go_offline(&self) -> Result<()> {
        self.store.dispatch(Action::Offline)?;
        Ok(())
    }

    /// Rebase the entity onto the server's operations since its version.
    ///
    /// An entity with no known version is fetched again instead.
    pub async fn pull(&self, entity_name: &str, id: &str) -> Result<()> {
        let version_id = self
            .store
            .snapshot()
            .entity_info(entity_name, id)?
            .version_id
            .clone();
        let Some(version_id) = version_id else {
            return self.follow(entity_name, id).await;
        };

        let tag = self.begin()?;
        let result = self.client.pull(entity_name, id, &version_id).await;
        if !self.finish(&tag)? {
            return Ok(());
        }
        match result {
            Ok(command) => {
                self.store.dispatch(Action::Rebase(command))?;
                Ok(())
            }
            Err(err) => self.fail(&tag, err),
        }
    }

    /// Patch a followed entity with a server diff.
    ///
    /// Returns false when the entity is not followed or the diff is stale.
    pub fn apply_version_diff(&self, diff: VersionDiff) -> Result<bool> {
        let state = self.store.snapshot();
        if !state.has_entity(&diff.entity_name, &diff.id) || state.is_stale(&diff)? {
            return Ok(false);
        }
        self.store.dispatch(Action::Patch(diff))?;
        Ok(true)
    }

    /// Apply every diff already waiting on `diffs`, returning how many were applied.
    pub fn pump_diffs(&self, diffs: &mut broadcast::Receiver<VersionDiff>) -> Result<usize> {
        let mut applied = 0;
        loop {
            match diffs.try_recv() {
                Ok(diff) => {
                    if self.apply_version_diff(diff)? {
                        applied += 1;
                    }
                }
                Err(TryRecvError::Empty) => return Ok(applied),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "version diffs lagged; pull to catch up");
                }
                Err(TryRecvError::Closed) => return Err(ClientError::Closed),
            }
        }
    }

    /// Log in and follow the user entity.
    pub async fn login(&self, entity_name: &str, user_id: &str, password: &str) -> Result<()> {
        let tag = self.begin()?;
        let result = self
            .client
            .login(LoginCommand {
                entity_name: entity_name.to_string(),
                user_id: user_id.to_string(),
                password: password.to_string(),
            })
            .await;
        if !self.finish(&tag)? {
            return Ok(());
        }
        match result {
            Ok(response) => {
                self.store.dispatch(Action::SetSession {
                    session: response.session,
                    user: Some(response.user),
                    version_id: Some(response.version_id),
                })?;
                Ok(())
            }
            Err(err) => self.fail(&tag, err),
        }
    }

    /// End the session and stop following its user.
    pub async fn logout(&self) -> Result<()> {
        let Some(session) = self.store.snapshot().session.clone() else {
            return Ok(());
        };
        let tag = self.begin()?;
        let result = self.client.logout(&session.id).await;
        if !self.finish(&tag)? {
            return Ok(());
        }
        if let Err(err) = result {
            return self.fail(&tag, err);
        }
        self.store.dispatch(Action::UnsetSession)?;
        if let Some(user_id) = session.user_id {
            self.unfollow_if_followed(&session.entity_name, &user_id)?;
        }
        Ok(())
    }

    /// Delete an entity on the server and stop following it.
    pub async fn delete(&self, entity_name: &str, id: &str) -> Result<()> {
        let tag = self.begin()?;
        let result = self.client.delete(entity_name, id).await;
        if !self.finish(&tag)? {
            return Ok(());
        }
        match result {
            Ok(()) => self.unfollow_if_followed(entity_name, id),
            Err(err) => self.fail(&tag, err),
        }
    }

    /// Forget every in-flight request; their responses will be ignored.
    pub fn cancel_pending(&self) -> Result<usize> {
        let requests = self.store.snapshot().network.requests.clone();
        for tag in &requests {
            self.store
                .dispatch(Action::RemoveNetworkRequest(tag.clone()))?;
        }
        Ok(requests.len())
    }

    fn begin(&self) -> Result<String> {
        let tag = Ulid::new().to_string();
        self.store.dispatch(Action::NetworkRequest(tag.clone()))?;
        Ok(tag)
    }

    /// Close the request. Returns false when it was cancelled meanwhile.
    fn finish(&self, tag: &str) -> Result<bool> {
        if !self.store.snapshot().is_pending(tag) {
            debug!(tag, "ignoring response to cancelled request");
            return Ok(false);
        }
        self.store
            .dispatch(Action::RemoveNetworkRequest(tag.to_string()))?;
        Ok(true)
    }

    fn fail<T>(&self, tag: &str, err: RemoteError) -> Result<T> {
        self.record_failure(tag, &err)?;
        Err(err.into())
    }

    fn record_failure(&self, tag: &str, err: &RemoteError) -> Result<()> {
        if err.is_network() {
            warn!(tag, error = %err, "server unreachable; going offline");
            self.store.dispatch(Action::Offline)?;
        } else {
            self.store.dispatch(Action::Error {
                error: err.clone().into(),
                action_tag: tag.to_string(),
            })?;
        }
        Ok(())
    }

    fn claim(&self, entity_name: &str, id: &str) -> Option<InFlight<'_>> {
        let key = (entity_name.to_string(), id.to_string());
        if !self.in_flight.lock().insert(key.clone()) {
            return None;
        }
        Some(InFlight {
            entities: &self.in_flight,
            key,
        })
    }

    /// Remove queue entries for the entity covered by `acknowledged` commits.
    fn retire_queued(&self, entity_name: &str, id: &str, acknowledged: u64) -> Result<()> {
        let state = self.store.snapshot();
        let mut remaining = acknowledged;
        for entry in state
            .unreached_commits
            .iter()
            .filter(|c| c.entity_name == entity_name && c.id == id)
        {
            if entry.commit_count > remaining {
                break;
            }
            remaining -= entry.commit_count;
            self.store
                .dispatch(Action::RemoveUnreachedCommits(entry.clone()))?;
        }
        Ok(())
    }

    fn unfollow_if_followed(&self, entity_name: &str, id: &str) -> Result<()> {
        if self.store.snapshot().has_entity(entity_name, id) {
            self.store.dispatch(Action::Unfollow {
                entity_name: entity_name.to_string(),
                id: id.to_string(),
            })?;
        }
        Ok(())
    }
}
