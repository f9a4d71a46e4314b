//! The entity server seam and an in-memory server for tests and simulation.

use crate::error::RemoteError;
use async_trait::async_trait;
use mooring_assign::{apply_all, UpdateOperation, Value};
use mooring_state::{ErrorKind, PushCommand, Session, VersionDiff};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use ulid::Ulid;

/// An entity as fetched from the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fetched {
    pub entity: Value,
    pub version_id: String,
}

/// Local commits sent to the server, made against `version_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    pub entity_name: String,
    pub id: String,
    pub version_id: Option<String>,
    pub operations: Vec<UpdateOperation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginCommand {
    pub entity_name: String,
    pub user_id: String,
    pub password: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub session: Session,
    pub user: Value,
    pub version_id: String,
}

/// Client for a versioned entity server.
#[async_trait]
pub trait EntityClient: Send + Sync + 'static {
    /// Fetch an entity and its current version.
    async fn get(&self, entity_name: &str, id: &str) -> Result<Fetched, RemoteError>;

    /// Apply commits on the server.
    ///
    /// The response carries the new version and the operations other writers
    /// applied since `request.version_id`, excluding the pushed ones.
    async fn push(&self, request: PushRequest) -> Result<PushCommand, RemoteError>;

    /// The operations applied since `version_id`.
    async fn pull(
        &self,
        entity_name: &str,
        id: &str,
        version_id: &str,
    ) -> Result<PushCommand, RemoteError>;

    async fn login(&self, command: LoginCommand) -> Result<LoginResponse, RemoteError>;

    async fn logout(&self, session_id: &str) -> Result<(), RemoteError>;

    async fn delete(&self, entity_name: &str, id: &str) -> Result<(), RemoteError>;
}

type EntityKey = (String, String);

struct Version {
    id: String,
    operation: Option<UpdateOperation>,
}

struct StoredEntity {
    current: Value,
    versions: Vec<Version>,
}

impl StoredEntity {
    fn head_version(&self) -> &str {
        self.versions.last().map(|v| v.id.as_str()).unwrap_or_default()
    }

    fn operations_since(&self, version_id: &str) -> Result<Vec<UpdateOperation>, RemoteError> {
        let index = self
            .versions
            .iter()
            .position(|v| v.id == version_id)
            .ok_or_else(|| {
                RemoteError::rejected(
                    ErrorKind::BadRequest,
                    format!("unknown version {}", version_id),
                )
            })?;
        Ok(self.versions[index + 1..]
            .iter()
            .filter_map(|v| v.operation.clone())
            .collect())
    }
}

struct Account {
    password: String,
}

/// In-memory versioned entity server.
///
/// Every pushed operation becomes its own version and is broadcast as a
/// [`VersionDiff`] to subscribers.
pub struct MemoryEntityClient {
    entities: RwLock<HashMap<EntityKey, StoredEntity>>,
    accounts: RwLock<HashMap<EntityKey, Account>>,
    sessions: RwLock<HashMap<String, Session>>,
    diff_tx: broadcast::Sender<VersionDiff>,
    reachable: AtomicBool,
}

impl MemoryEntityClient {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a server whose diff channel buffers `capacity` diffs per subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        let (diff_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            entities: RwLock::new(HashMap::new()),
            accounts: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            diff_tx,
            reachable: AtomicBool::new(true),
        }
    }

    /// Simulate losing or regaining connectivity.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    /// Subscribe to version diffs.
    pub fn subscribe(&self) -> broadcast::Receiver<VersionDiff> {
        self.diff_tx.subscribe()
    }

    /// Store a new entity, returning its first version.
    pub fn insert(&self, entity_name: &str, entity: Value) -> Result<String, RemoteError> {
        let id = entity
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                RemoteError::rejected(ErrorKind::BadRequest, "entity has no string id")
            })?
            .to_string();

        let mut entities = self.entities.write();
        let key = (entity_name.to_string(), id);
        if entities.contains_key(&key) {
            return Err(RemoteError::rejected(
                ErrorKind::BadRequest,
                format!("{} {} already exists", entity_name, key.1),
            ));
        }
        let version_id = Ulid::new().to_string();
        entities.insert(
            key,
            StoredEntity {
                current: entity,
                versions: vec![Version {
                    id: version_id.clone(),
                    operation: None,
                }],
            },
        );
        Ok(version_id)
    }

    /// Store a user entity that can log in with `password`.
    pub fn register(
        &self,
        entity_name: &str,
        user: Value,
        password: impl Into<String>,
    ) -> Result<String, RemoteError> {
        let user_id = user
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let version_id = self.insert(entity_name, user)?;
        self.accounts.write().insert(
            (entity_name.to_string(), user_id),
            Account {
                password: password.into(),
            },
        );
        Ok(version_id)
    }

    /// The server's current copy of an entity.
    pub fn entity(&self, entity_name: &str, id: &str) -> Option<Value> {
        self.entities
            .read()
            .get(&key(entity_name, id))
            .map(|stored| stored.current.clone())
    }

    pub fn version(&self, entity_name: &str, id: &str) -> Option<String> {
        self.entities
            .read()
            .get(&key(entity_name, id))
            .map(|stored| stored.head_version().to_string())
    }

    fn ensure_reachable(&self) -> Result<(), RemoteError> {
        if self.is_reachable() {
            Ok(())
        } else {
            Err(RemoteError::Network("server unreachable".to_string()))
        }
    }
}

impl Default for MemoryEntityClient {
    fn default() -> Self {
        Self::new()
    }
}

fn key(entity_name: &str, id: &str) -> EntityKey {
    (entity_name.to_string(), id.to_string())
}

fn not_found(entity_name: &str, id: &str) -> RemoteError {
    RemoteError::rejected(
        ErrorKind::NotFound,
        format!("no entity found: entityName \"{}\", id \"{}\"", entity_name, id),
    )
}

#[async_trait]
impl EntityClient for MemoryEntityClient {
    async fn get(&self, entity_name: &str, id: &str) -> Result<Fetched, RemoteError> {
        self.ensure_reachable()?;
        let entities = self.entities.read();
        let stored = entities
            .get(&key(entity_name, id))
            .ok_or_else(|| not_found(entity_name, id))?;
        Ok(Fetched {
            entity: stored.current.clone(),
            version_id: stored.head_version().to_string(),
        })
    }

    async fn push(&self, request: PushRequest) -> Result<PushCommand, RemoteError> {
        self.ensure_reachable()?;
        let version_id = request.version_id.as_deref().ok_or_else(|| {
            RemoteError::rejected(ErrorKind::BadRequest, "push without a version")
        })?;

        let mut entities = self.entities.write();
        let stored = entities
            .get_mut(&key(&request.entity_name, &request.id))
            .ok_or_else(|| not_found(&request.entity_name, &request.id))?;
        let operations = stored.operations_since(version_id)?;
        stored.current = apply_all(&stored.current, &request.operations)
            .map_err(|err| RemoteError::rejected(ErrorKind::BadRequest, err.to_string()))?;

        for operation in request.operations {
            let prev_version_id = stored.head_version().to_string();
            let next = Ulid::new().to_string();
            let _ = self.diff_tx.send(VersionDiff {
                entity_name: request.entity_name.clone(),
                id: request.id.clone(),
                version_id: next.clone(),
                prev_version_id,
                operation: operation.clone(),
            });
            stored.versions.push(Version {
                id: next,
                operation: Some(operation),
            });
        }

        Ok(PushCommand {
            entity_name: request.entity_name,
            id: request.id,
            version_id: stored.head_version().to_string(),
            operations,
        })
    }

    async fn pull(
        &self,
        entity_name: &str,
        id: &str,
        version_id: &str,
    ) -> Result<PushCommand, RemoteError> {
        self.ensure_reachable()?;
        let entities = self.entities.read();
        let stored = entities
            .get(&key(entity_name, id))
            .ok_or_else(|| not_found(entity_name, id))?;
        Ok(PushCommand {
            entity_name: entity_name.to_string(),
            id: id.to_string(),
            version_id: stored.head_version().to_string(),
            operations: stored.operations_since(version_id)?,
        })
    }

    async fn login(&self, command: LoginCommand) -> Result<LoginResponse, RemoteError> {
        self.ensure_reachable()?;
        let authorized = self
            .accounts
            .read()
            .get(&key(&command.entity_name, &command.user_id))
            .is_some_and(|account| account.password == command.password);
        if !authorized {
            return Err(RemoteError::rejected(
                ErrorKind::Unauthorized,
                "invalid user id or password",
            ));
        }
        let fetched = self.get(&command.entity_name, &command.user_id).await?;
        let session = Session::new(Ulid::new().to_string(), command.entity_name.as_str())
            .with_user(command.user_id.as_str());
        self.sessions
            .write()
            .insert(session.id.clone(), session.clone());
        Ok(LoginResponse {
            session,
            user: fetched.entity,
            version_id: fetched.version_id,
        })
    }

    async fn logout(&self, session_id: &str) -> Result<(), RemoteError> {
        self.ensure_reachable()?;
        match self.sessions.write().remove(session_id) {
            Some(_) => Ok(()),
            None => Err(RemoteError::rejected(
                ErrorKind::NotFound,
                format!("no session {}", session_id),
            )),
        }
    }

    async fn delete(&self, entity_name: &str, id: &str) -> Result<(), RemoteError> {
        self.ensure_reachable()?;
        self.entities
            .write()
            .remove(&key(entity_name, id))
            .map(|_| ())
            .ok_or_else(|| not_found(entity_name, id))
    }
}
