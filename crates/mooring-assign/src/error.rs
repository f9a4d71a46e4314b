//! Error types for the update interpreter.

use thiserror::Error;

/// Errors that can occur while parsing or applying update operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssignError {
    #[error("invalid {operator} at \"{path}\": {reason}")]
    InvalidOperation {
        operator: String,
        path: String,
        reason: String,
    },

    #[error("malformed update operation: {0}")]
    MalformedOperation(String),

    #[error("cannot restore {type_name} from document: {reason}")]
    Restore {
        type_name: &'static str,
        reason: String,
    },
}

impl AssignError {
    pub(crate) fn invalid(
        operator: impl Into<String>,
        path: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        AssignError::InvalidOperation {
            operator: operator.into(),
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    pub fn restore(type_name: &'static str, reason: impl Into<String>) -> Self {
        AssignError::Restore {
            type_name,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for AssignError {
    fn from(err: serde_json::Error) -> Self {
        AssignError::MalformedOperation(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AssignError>;
