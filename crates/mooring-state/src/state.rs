//! The entity version store.
//!
//! `LocalState` is only ever changed by applying an [`UpdateOperation`]
//! produced by a command. Its document form mirrors its serde form, so the
//! same paths address both.

use crate::error::LocalError;
use mooring_assign::{AssignError, DocumentPath, Fields, Restorable, UpdateOperation, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Entities by entity name, then by id.
pub type EntityMap = BTreeMap<String, BTreeMap<String, EntityInfo>>;

/// Local knowledge of one entity.
///
/// `head` is `None` exactly when `commits` is empty; otherwise it is `origin`
/// with every commit applied in order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityInfo {
    /// Last state acknowledged by the server.
    pub origin: Value,
    pub version_id: Option<String>,
    /// Local commits not yet acknowledged.
    pub commits: Vec<UpdateOperation>,
    pub head: Option<Value>,
}

impl EntityInfo {
    /// A clean entity.
    pub fn new(origin: Value, version_id: Option<String>) -> Self {
        Self {
            origin,
            version_id,
            commits: Vec::new(),
            head: None,
        }
    }

    /// Head if there are local commits, else origin.
    pub fn current(&self) -> &Value {
        self.head.as_ref().unwrap_or(&self.origin)
    }

    pub fn is_dirty(&self) -> bool {
        !self.commits.is_empty()
    }

    pub(crate) fn document(&self) -> Value {
        Value::object([
            ("origin", self.origin.clone()),
            ("versionId", Value::from(self.version_id.clone())),
            (
                "commits",
                Value::array(self.commits.iter().map(UpdateOperation::to_value)),
            ),
            ("head", self.head.clone().unwrap_or(Value::Null)),
        ])
    }
}

impl Restorable for EntityInfo {
    fn to_document(&self) -> mooring_assign::Result<Value> {
        Ok(self.document())
    }

    fn restore(document: Value) -> mooring_assign::Result<Self> {
        let fields = Fields::of("EntityInfo", &document)?;
        Ok(EntityInfo {
            origin: fields.required("origin")?.clone(),
            version_id: fields.optional_string("versionId")?,
            commits: fields.restore_each("commits")?,
            head: fields.optional("head").cloned(),
        })
    }
}

/// Commits sent to the server whose acknowledgement has not arrived.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreachedCommit {
    pub entity_name: String,
    pub id: String,
    pub commit_count: u64,
}

impl UnreachedCommit {
    pub fn new(entity_name: impl Into<String>, id: impl Into<String>, commit_count: u64) -> Self {
        Self {
            entity_name: entity_name.into(),
            id: id.into(),
            commit_count,
        }
    }

    pub(crate) fn document(&self) -> Value {
        Value::object([
            ("entityName", Value::from(self.entity_name.as_str())),
            ("id", Value::from(self.id.as_str())),
            ("commitCount", Value::Int(self.commit_count as i64)),
        ])
    }
}

impl Restorable for UnreachedCommit {
    fn to_document(&self) -> mooring_assign::Result<Value> {
        Ok(self.document())
    }

    fn restore(document: Value) -> mooring_assign::Result<Self> {
        let fields = Fields::of("UnreachedCommit", &document)?;
        let commit_count = fields.i64("commitCount")?;
        Ok(UnreachedCommit {
            entity_name: fields.string("entityName")?,
            id: fields.string("id")?,
            commit_count: u64::try_from(commit_count).map_err(|_| {
                AssignError::restore("UnreachedCommit", "commitCount must not be negative")
            })?,
        })
    }
}

/// In-flight requests and connectivity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkState {
    /// Tags of requests awaiting a response.
    pub requests: Vec<String>,
    pub is_online: bool,
}

impl Default for NetworkState {
    fn default() -> Self {
        Self {
            requests: Vec::new(),
            is_online: true,
        }
    }
}

impl Restorable for NetworkState {
    fn to_document(&self) -> mooring_assign::Result<Value> {
        Ok(Value::object([
            (
                "requests",
                Value::array(self.requests.iter().map(|t| Value::from(t.as_str()))),
            ),
            ("isOnline", Value::Bool(self.is_online)),
        ]))
    }

    fn restore(document: Value) -> mooring_assign::Result<Self> {
        let fields = Fields::of("NetworkState", &document)?;
        let requests = fields
            .required("requests")?
            .as_array()
            .ok_or_else(|| AssignError::restore("NetworkState", "requests must be an array"))?
            .iter()
            .map(|tag| {
                tag.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| AssignError::restore("NetworkState", "request tags must be strings"))
            })
            .collect::<mooring_assign::Result<_>>()?;
        Ok(NetworkState {
            requests,
            is_online: fields.bool("isOnline")?,
        })
    }
}

/// An authenticated session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    /// Entity name of the logged-in user.
    pub entity_name: String,
    pub user_id: Option<String>,
    /// RFC 3339 expiry.
    pub expired_at: Option<String>,
    #[serde(default)]
    pub values: Value,
}

impl Session {
    pub fn new(id: impl Into<String>, entity_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_name: entity_name.into(),
            user_id: None,
            expired_at: None,
            values: Value::Null,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

impl Restorable for Session {
    fn to_document(&self) -> mooring_assign::Result<Value> {
        Ok(Value::object([
            ("id", Value::from(self.id.as_str())),
            ("entityName", Value::from(self.entity_name.as_str())),
            ("userId", Value::from(self.user_id.clone())),
            ("expiredAt", Value::from(self.expired_at.clone())),
            ("values", self.values.clone()),
        ]))
    }

    fn restore(document: Value) -> mooring_assign::Result<Self> {
        let fields = Fields::of("Session", &document)?;
        Ok(Session {
            id: fields.string("id")?,
            entity_name: fields.string("entityName")?,
            user_id: fields.optional_string("userId")?,
            expired_at: fields.optional_string("expiredAt")?,
            values: fields.optional("values").cloned().unwrap_or(Value::Null),
        })
    }
}

/// The whole client-side state.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalState {
    pub entities: EntityMap,
    pub unreached_commits: Vec<UnreachedCommit>,
    pub network: NetworkState,
    pub session: Option<Session>,
    pub error: Option<LocalError>,
}

impl LocalState {
    /// No entities, empty queues, online.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Restorable for LocalState {
    fn to_document(&self) -> mooring_assign::Result<Value> {
        let entities = Value::object(self.entities.iter().map(|(name, by_id)| {
            (
                name.as_str(),
                Value::object(by_id.iter().map(|(id, info)| (id.as_str(), info.document()))),
            )
        }));
        let mut fields = vec![
            ("entities", entities),
            (
                "unreachedCommits",
                Value::array(self.unreached_commits.iter().map(UnreachedCommit::document)),
            ),
            ("network", self.network.to_document()?),
        ];
        if let Some(session) = &self.session {
            fields.push(("session", session.to_document()?));
        }
        if let Some(error) = &self.error {
            fields.push(("error", error.to_document()?));
        }
        Ok(Value::object(fields))
    }

    fn restore(document: Value) -> mooring_assign::Result<Self> {
        let fields = Fields::of("LocalState", &document)?;
        let entities = match fields.optional("entities") {
            None => EntityMap::new(),
            Some(entities) => entities
                .as_object()
                .ok_or_else(|| AssignError::restore("LocalState", "entities must be a mapping"))?
                .iter()
                .map(|(name, by_id)| {
                    let by_id = by_id
                        .as_object()
                        .ok_or_else(|| {
                            AssignError::restore("LocalState", format!("entities.{} must be a mapping", name))
                        })?
                        .iter()
                        .map(|(id, info)| Ok((id.clone(), EntityInfo::restore(info.clone())?)))
                        .collect::<mooring_assign::Result<BTreeMap<_, _>>>()?;
                    Ok((name.clone(), by_id))
                })
                .collect::<mooring_assign::Result<EntityMap>>()?,
        };
        Ok(LocalState {
            entities,
            unreached_commits: fields.restore_each("unreachedCommits")?,
            network: fields.restore("network")?,
            session: fields.restore_optional("session")?,
            error: fields.restore_optional("error")?,
        })
    }
}

/// A server-originated change, valid only against `prev_version_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDiff {
    pub entity_name: String,
    pub id: String,
    pub version_id: String,
    pub prev_version_id: String,
    pub operation: UpdateOperation,
}

/// The server's operation log since the client's last known version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushCommand {
    pub entity_name: String,
    pub id: String,
    pub version_id: String,
    pub operations: Vec<UpdateOperation>,
}

pub(crate) fn entity_path(entity_name: &str, id: &str) -> DocumentPath {
    DocumentPath::from_segments(["entities", entity_name, id])
}

pub(crate) fn entity_field(entity_name: &str, id: &str, field: &str) -> DocumentPath {
    entity_path(entity_name, id).child(field)
}
