//! Contracts of the embedded map server the harness drives. Implementations
//! live outside this crate (a test fixture implements them in `tests/`).

use crate::request::RequestConfig;
use anyhow::Result;
use std::sync::Arc;

/// What a request returns: the header blob (status and headers, one per
/// line) and the raw body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    pub headers: Vec<u8>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(headers: impl Into<Vec<u8>>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            headers: headers.into(),
            body: body.into(),
        }
    }
}

pub trait RequestHandler {
    fn handle_request(&self, config: &RequestConfig, query: &str) -> Result<RawResponse>;
}

pub trait EmbeddedServer: RequestHandler {
    fn server_interface(&self) -> &ServerInterface;
    fn server_interface_mut(&mut self) -> &mut ServerInterface;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerPermissions {
    pub can_read: bool,
    pub can_insert: bool,
    pub can_update: bool,
    pub can_delete: bool,
}

impl LayerPermissions {
    pub const ALL: LayerPermissions = LayerPermissions {
        can_read: true,
        can_insert: true,
        can_update: true,
        can_delete: true,
    };

    pub const NONE: LayerPermissions = LayerPermissions {
        can_read: false,
        can_insert: false,
        can_update: false,
        can_delete: false,
    };

    pub fn intersect(self, other: LayerPermissions) -> LayerPermissions {
        LayerPermissions {
            can_read: self.can_read && other.can_read,
            can_insert: self.can_insert && other.can_insert,
            can_update: self.can_update && other.can_update,
            can_delete: self.can_delete && other.can_delete,
        }
    }
}

/// Hook the server consults before exposing a layer. Every method has a
/// permissive default.
pub trait AccessControlFilter: Send + Sync {
    fn name(&self) -> &str {
        "access-control"
    }

    fn layer_readable(&self, layer: &str) -> bool {
        self.layer_permissions(layer).can_read
    }

    fn layer_permissions(&self, _layer: &str) -> LayerPermissions {
        LayerPermissions::ALL
    }

    /// Contribution to the server's cache key; `None` leaves it unchanged.
    fn cache_key(&self) -> Option<String> {
        None
    }
}

struct RegisteredFilter {
    priority: i32,
    filter: Arc<dyn AccessControlFilter>,
}

/// Server-side registry of access control filters.
#[derive(Default)]
pub struct ServerInterface {
    access_controls: Vec<RegisteredFilter>,
}

impl ServerInterface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_access_control(&mut self, filter: Arc<dyn AccessControlFilter>, priority: i32) {
        info!(
            "registering access control \"{}\" with priority {}",
            filter.name(),
            priority
        );
        // stable position: after every filter whose priority is <= ours
        let index = self
            .access_controls
            .partition_point(|registered| registered.priority <= priority);
        self.access_controls
            .insert(index, RegisteredFilter { priority, filter });
    }

    /// Filters in ascending priority, ties in registration order.
    pub fn access_controls(&self) -> impl Iterator<Item = (i32, &dyn AccessControlFilter)> {
        self.access_controls
            .iter()
            .map(|registered| (registered.priority, registered.filter.as_ref()))
    }

    pub fn access_control_count(&self) -> usize {
        self.access_controls.len()
    }

    pub fn layer_readable(&self, layer: &str) -> bool {
        self.access_controls()
            .all(|(_, filter)| filter.layer_readable(layer))
    }

    pub fn layer_permissions(&self, layer: &str) -> LayerPermissions {
        self.access_controls()
            .fold(LayerPermissions::ALL, |acc, (_, filter)| {
                acc.intersect(filter.layer_permissions(layer))
            })
    }

    pub fn cache_key(&self) -> Option<String> {
        let keys: Vec<String> = self
            .access_controls()
            .filter_map(|(_, filter)| filter.cache_key())
            .collect();
        if keys.is_empty() {
            None
        } else {
            Some(keys.join("-"))
        }
    }
}
