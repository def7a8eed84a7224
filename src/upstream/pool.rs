//! Shared upstream pool.
//!
//! # Responsibilities
//! - Receive handles from inbound connections that are closing
//! - Keep a bounded number of idle handles per route for reuse
//! - Lend idle handles to processors that open upstream connections
//!
//! # Design Decisions
//! - Keyed by route, shared by every connection (DashMap, no global lock)
//! - Newest handles are kept; the oldest are evicted past the per-route limit

use dashmap::DashMap;

use crate::config::UpstreamConfig;
use crate::net::ConnectionId;
use crate::observability::metrics;
use crate::upstream::registry::UpstreamHandle;
use crate::upstream::route::RouteKey;

/// Receives the upstream handles of an inbound connection when it terminates.
pub trait UpstreamPool: Send + Sync {
    fn inbound_closed(&self, connection: ConnectionId, handle: UpstreamHandle);
}

/// Route-keyed pool of idle upstream handles.
#[derive(Debug)]
pub struct IdlePool {
    idle: DashMap<RouteKey, Vec<UpstreamHandle>>,
    max_idle_per_route: usize,
}

impl IdlePool {
    pub fn new(config: &UpstreamConfig) -> Self {
        Self {
            idle: DashMap::new(),
            max_idle_per_route: config.max_idle_per_route,
        }
    }

    /// Take the most recently returned idle handle for `route`.
    pub fn checkout(&self, route: &RouteKey) -> Option<UpstreamHandle> {
        self.idle.get_mut(route).and_then(|mut handles| handles.pop())
    }

    pub fn idle_count(&self, route: &RouteKey) -> usize {
        self.idle.get(route).map(|handles| handles.len()).unwrap_or(0)
    }
}

impl UpstreamPool for IdlePool {
    fn inbound_closed(&self, connection: ConnectionId, handle: UpstreamHandle) {
        if self.max_idle_per_route == 0 {
            tracing::debug!(connection_id = %connection, upstream = %handle.id(), "Idle pooling disabled, evicting");
            metrics::record_upstream_released("evicted");
            return;
        }

        let mut handles = self.idle.entry(handle.route().clone()).or_default();
        if handles.len() >= self.max_idle_per_route {
            let evicted = handles.remove(0);
            tracing::debug!(
                connection_id = %connection,
                route = %evicted.route(),
                upstream = %evicted.id(),
                "Idle limit reached, evicting oldest upstream"
            );
            metrics::record_upstream_released("evicted");
        }
        handles.push(handle);
        metrics::record_upstream_released("pooled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(max_idle: usize) -> IdlePool {
        IdlePool::new(&UpstreamConfig {
            max_idle_per_route: max_idle,
        })
    }

    #[test]
    fn released_handles_can_be_checked_out() {
        let pool = pool(4);
        let route = RouteKey::new("http", "backend", 80);
        let handle = UpstreamHandle::new(route.clone());

        pool.inbound_closed(ConnectionId::new(), handle.clone());
        assert_eq!(pool.idle_count(&route), 1);
        assert_eq!(pool.checkout(&route), Some(handle));
        assert_eq!(pool.checkout(&route), None);
    }

    #[test]
    fn oldest_handle_is_evicted_past_limit() {
        let pool = pool(2);
        let route = RouteKey::new("http", "backend", 80);
        let handles: Vec<_> = (0..3).map(|_| UpstreamHandle::new(route.clone())).collect();
        for handle in &handles {
            pool.inbound_closed(ConnectionId::new(), handle.clone());
        }

        assert_eq!(pool.idle_count(&route), 2);
        assert_eq!(pool.checkout(&route), Some(handles[2].clone()));
        assert_eq!(pool.checkout(&route), Some(handles[1].clone()));
        assert_eq!(pool.checkout(&route), None);
    }

    #[test]
    fn zero_limit_keeps_nothing() {
        let pool = pool(0);
        let route = RouteKey::new("http", "backend", 80);
        pool.inbound_closed(ConnectionId::new(), UpstreamHandle::new(route.clone()));
        assert_eq!(pool.idle_count(&route), 0);
    }

    #[test]
    fn routes_are_pooled_separately() {
        let pool = pool(4);
        let a = RouteKey::new("http", "a", 80);
        let b = RouteKey::new("http", "b", 80);
        pool.inbound_closed(ConnectionId::new(), UpstreamHandle::new(a.clone()));

        assert!(pool.checkout(&b).is_none());
        assert!(pool.checkout(&a).is_some());
    }
}
