//! Error types for the local state layer.

use mooring_assign::{AssignError, Fields, Restorable, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised by state commands.
///
/// A stale version diff is not an error; `patch` discards it and logs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateError {
    #[error("no entity found: entityName \"{entity_name}\", id \"{id}\"")]
    NotFound { entity_name: String, id: String },

    #[error("{entity_name} entity has no string \"id\" field")]
    MissingId { entity_name: String },

    #[error(transparent)]
    Assign(#[from] AssignError),
}

impl StateError {
    pub fn not_found(entity_name: &str, id: &str) -> Self {
        StateError::NotFound {
            entity_name: entity_name.to_string(),
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StateError>;

/// Category of a reported failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    InternalError,
    NetworkFailed,
}

impl ErrorKind {
    fn name(self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::InternalError => "InternalError",
            ErrorKind::NetworkFailed => "NetworkFailed",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        [
            ErrorKind::BadRequest,
            ErrorKind::Unauthorized,
            ErrorKind::Forbidden,
            ErrorKind::NotFound,
            ErrorKind::InternalError,
            ErrorKind::NetworkFailed,
        ]
        .into_iter()
        .find(|kind| kind.name() == name)
    }
}

/// Where a failure happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSite {
    Local,
    Server,
}

/// A failure already in the normalized `{ type, at, message }` shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportedError {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub at: ErrorSite,
    pub message: String,
}

impl ReportedError {
    pub fn new(kind: ErrorKind, at: ErrorSite, message: impl Into<String>) -> Self {
        Self {
            kind,
            at,
            message: message.into(),
        }
    }

    /// Wrap an arbitrary failure as a local internal error.
    pub fn local(error: &dyn fmt::Display) -> Self {
        Self::new(ErrorKind::InternalError, ErrorSite::Local, error.to_string())
    }
}

impl fmt::Display for ReportedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}): {}", self.kind.name(), self.at, self.message)
    }
}

impl std::error::Error for ReportedError {}

impl From<StateError> for ReportedError {
    fn from(err: StateError) -> Self {
        ReportedError::local(&err)
    }
}

impl From<AssignError> for ReportedError {
    fn from(err: AssignError) -> Self {
        ReportedError::local(&err)
    }
}

/// The error stored in `LocalState`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalError {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub at: ErrorSite,
    pub message: String,
    pub action_tag: String,
}

impl Restorable for LocalError {
    fn to_document(&self) -> mooring_assign::Result<Value> {
        Ok(Value::object([
            ("type", Value::from(self.kind.name())),
            (
                "at",
                Value::from(match self.at {
                    ErrorSite::Local => "local",
                    ErrorSite::Server => "server",
                }),
            ),
            ("message", Value::from(self.message.as_str())),
            ("actionTag", Value::from(self.action_tag.as_str())),
        ]))
    }

    fn restore(document: Value) -> mooring_assign::Result<Self> {
        let fields = Fields::of("LocalError", &document)?;
        let kind = fields.string("type")?;
        let at = fields.string("at")?;
        Ok(LocalError {
            kind: ErrorKind::from_name(&kind)
                .ok_or_else(|| AssignError::restore("LocalError", format!("unknown error type {}", kind)))?,
            at: match at.as_str() {
                "local" => ErrorSite::Local,
                "server" => ErrorSite::Server,
                other => {
                    return Err(AssignError::restore(
                        "LocalError",
                        format!("unknown error site {}", other),
                    ))
                }
            },
            message: fields.string("message")?,
            action_tag: fields.string("actionTag")?,
        })
    }
}
