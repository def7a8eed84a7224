//! Per-connection map of reusable upstream connections.
//!
//! # Responsibilities
//! - Hold at most one upstream handle per route for one inbound connection
//! - Hand every remaining handle to the pool when the inbound connection ends
//!
//! # Design Decisions
//! - Owned by the connection context; never shared, so no locking
//! - Replacing or removing a handle gives it back to the caller, who closes it

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::net::ConnectionId;
use crate::upstream::pool::UpstreamPool;
use crate::upstream::route::RouteKey;

static UPSTREAM_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an upstream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UpstreamId(u64);

impl std::fmt::Display for UpstreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "upstream-{}", self.0)
    }
}

/// A reusable outbound connection. The socket itself belongs to the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamHandle {
    id: UpstreamId,
    route: RouteKey,
    opened_at: Instant,
}

impl UpstreamHandle {
    pub fn new(route: RouteKey) -> Self {
        Self {
            id: UpstreamId(UPSTREAM_ID_COUNTER.fetch_add(1, Ordering::Relaxed)),
            route,
            opened_at: Instant::now(),
        }
    }

    pub fn id(&self) -> UpstreamId {
        self.id
    }

    pub fn route(&self) -> &RouteKey {
        &self.route
    }

    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }
}

#[derive(Debug, Default)]
pub struct RouteRegistry {
    routes: HashMap<RouteKey, UpstreamHandle>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. Returns the replaced handle, which the caller must close.
    pub fn put(&mut self, route: RouteKey, handle: UpstreamHandle) -> Option<UpstreamHandle> {
        self.routes.insert(route, handle)
    }

    pub fn get(&self, route: &RouteKey) -> Option<&UpstreamHandle> {
        self.routes.get(route)
    }

    pub fn remove(&mut self, route: &RouteKey) -> Option<UpstreamHandle> {
        tracing::debug!(route = %route, "Removing upstream handle");
        self.routes.remove(route)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Empty the registry, telling the pool about every handle it held.
    pub fn release_all(&mut self, connection: ConnectionId, pool: &dyn UpstreamPool) -> usize {
        let released = self.routes.len();
        for (route, handle) in self.routes.drain() {
            tracing::trace!(connection_id = %connection, route = %route, upstream = %handle.id(), "Releasing upstream handle");
            pool.inbound_closed(connection, handle);
        }
        released
    }
}
