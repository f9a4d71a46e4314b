//! Client configuration.

/// Configuration for a [`LocalStore`](crate::LocalStore) and its
/// [`SyncManager`](crate::SyncManager).
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Entity names initialized to an empty mapping on startup.
    pub initial_entities: Vec<String>,
    /// Whether the store starts online.
    pub start_online: bool,
    /// Cap on commits sent in one push. `None` sends all of them.
    pub max_push_batch: Option<usize>,
    /// Capacity of the store event channel.
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            initial_entities: Vec::new(),
            start_online: true,
            max_push_batch: None,
            event_capacity: 100,
        }
    }
}

/// Builder for client configuration.
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    pub fn entity(mut self, entity_name: impl Into<String>) -> Self {
        self.config.initial_entities.push(entity_name.into());
        self
    }

    pub fn start_online(mut self, online: bool) -> Self {
        self.config.start_online = online;
        self
    }

    pub fn max_push_batch(mut self, max: usize) -> Self {
        self.config.max_push_batch = Some(max);
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
