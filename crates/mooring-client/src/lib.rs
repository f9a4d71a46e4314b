//! Mooring Client - the local store and its sync loop
//!
//! Applications keep an optimistic copy of server entities in a
//! [`LocalStore`], commit edits locally, and let a [`SyncManager`] push them
//! to an [`EntityClient`] when the server can be reached.
//!
//! # Quick Start
//!
//! ```rust
//! use mooring_client::prelude::*;
//! use mooring_assign::{UpdateOperation, Value};
//! use std::sync::Arc;
//!
//! tokio_test::block_on(async {
//!     let server = Arc::new(MemoryEntityClient::new());
//!     server
//!         .insert("note", Value::from(serde_json::json!({ "id": "n1", "count": 0 })))
//!         .unwrap();
//!
//!     let config = ClientConfigBuilder::new().entity("note").build();
//!     let store = Arc::new(LocalStore::new(&config).unwrap());
//!     let sync = SyncManager::new(store.clone(), server.clone(), config);
//!
//!     sync.follow("note", "n1").await.unwrap();
//!     sync.commit_and_push("note", "n1", UpdateOperation::new().inc("count", 1))
//!         .await
//!         .unwrap();
//!
//!     assert_eq!(
//!         server.entity("note", "n1").unwrap().get("count"),
//!         Some(&Value::Int(1))
//!     );
//! });
//! ```
//!
//! # Architecture
//!
//! - [`action`] - The actions a store accepts
//! - [`store`] - The single owner of the local state
//! - [`remote`] - The entity server seam and an in-memory server
//! - [`sync`] - Push, pull, repush and diff handling
//! - [`config`] - Client configuration
//! - [`error`] - Error types

pub mod action;
pub mod config;
pub mod error;
pub mod remote;
pub mod store;
pub mod sync;

// Re-exports for convenience
pub use action::Action;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{ClientError, RemoteError, Result};
pub use remote::{
    EntityClient, Fetched, LoginCommand, LoginResponse, MemoryEntityClient, PushRequest,
};
pub use store::{LocalStore, StoreEvent};
pub use sync::{PushOutcome, SyncManager};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::action::Action;
    pub use crate::config::{ClientConfig, ClientConfigBuilder};
    pub use crate::error::{ClientError, RemoteError};
    pub use crate::remote::{EntityClient, MemoryEntityClient};
    pub use crate::store::{LocalStore, StoreEvent};
    pub use crate::sync::{PushOutcome, SyncManager};
}
