use crate::core::Capabilities;
use crate::delivery::CallbackDelivery;
use std::collections::HashMap;
use std::time::Duration;

/// Edit capabilities per named connection.
///
/// Which connections accept add/remove/move is a property of the remote API,
/// so it is configured here rather than derived from the connection name.
/// Connections absent from the table are read-only.
#[derive(Debug, Clone, Default)]
pub struct ConnectionPolicy {
    entries: HashMap<String, Capabilities>,
}

impl ConnectionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow add/remove on the named connection
    pub fn editable(self, connection: &str) -> Self {
        self.with(connection, Capabilities::EDITABLE)
    }

    /// Allow add/remove and reordering on the named connection
    pub fn reorderable(self, connection: &str) -> Self {
        self.with(connection, Capabilities::REORDERABLE)
    }

    pub fn with(mut self, connection: &str, capabilities: Capabilities) -> Self {
        self.entries
            .insert(connection.to_string(), capabilities.normalized());
        self
    }

    pub fn capabilities_for(&self, connection: &str) -> Capabilities {
        self.entries
            .get(connection)
            .copied()
            .unwrap_or(Capabilities::READ_ONLY)
    }
}

/// Collection configuration
///
/// Shared by every collection created from the same [`Api`](crate::Api).
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    /// Number of identifiers requested per page
    pub page_size: usize,

    /// Upper bound for a single page fetch or edit mirror call
    pub fetch_timeout: Option<Duration>,

    /// Where completion callbacks run
    pub callback_delivery: CallbackDelivery,

    /// Capabilities of named connections
    pub connection_policy: ConnectionPolicy,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            fetch_timeout: Some(Duration::from_secs(30)),
            callback_delivery: CallbackDelivery::Inline,
            connection_policy: ConnectionPolicy::default(),
        }
    }
}

impl CollectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the page size
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the fetch timeout
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Disable the fetch timeout
    pub fn no_fetch_timeout(mut self) -> Self {
        self.fetch_timeout = None;
        self
    }

    /// Set the callback delivery context
    pub fn callback_delivery(mut self, delivery: CallbackDelivery) -> Self {
        self.callback_delivery = delivery;
        self
    }

    /// Set the connection policy table
    pub fn connection_policy(mut self, policy: ConnectionPolicy) -> Self {
        self.connection_policy = policy;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.page_size == 0 {
            return Err("page_size must be > 0".to_string());
        }

        if let Some(timeout) = self.fetch_timeout {
            if timeout.is_zero() {
                return Err("fetch_timeout must be > 0 when set".to_string());
            }
        }

        Ok(())
    }
}
