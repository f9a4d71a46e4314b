//! Error types for the client.

use mooring_state::{ErrorKind, ErrorSite, ReportedError, StateError};
use thiserror::Error;

/// A failed call to the entity server.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    /// The server could not be reached. Commits stay queued for repush.
    #[error("network failure: {0}")]
    Network(String),

    /// The server answered with an error.
    #[error("rejected by server: {0}")]
    Rejected(ReportedError),
}

impl RemoteError {
    pub fn rejected(kind: ErrorKind, message: impl Into<String>) -> Self {
        RemoteError::Rejected(ReportedError::new(kind, ErrorSite::Server, message))
    }

    pub fn is_network(&self) -> bool {
        matches!(self, RemoteError::Network(_))
    }
}

/// Errors returned by the store and sync manager.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The server stopped broadcasting version diffs.
    #[error("version diff stream closed")]
    Closed,
}

impl From<RemoteError> for ReportedError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Rejected(reported) => reported,
            RemoteError::Network(message) => {
                ReportedError::new(ErrorKind::NetworkFailed, ErrorSite::Local, message)
            }
        }
    }
}

impl From<ClientError> for ReportedError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Remote(remote) => remote.into(),
            ClientError::State(state) => state.into(),
            other => ReportedError::local(&other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
