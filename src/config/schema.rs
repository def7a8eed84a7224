//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the ingress.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the ingress pipeline.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct IngressConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Maximum body size enforcement.
    pub size_guard: SizeGuardConfig,

    /// Event handoff channel settings.
    pub channel: ChannelConfig,

    /// Consumer worker settings.
    pub workers: WorkerConfig,

    /// Shared upstream pool settings.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Request body size policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SizeGuardConfig {
    /// Enable body size enforcement.
    pub enabled: bool,

    /// Largest accepted body, in bytes. Equal to the limit is still accepted.
    pub max_body_bytes: usize,

    /// Status code of the rejection response.
    pub reject_status: u16,

    /// Body of the rejection response.
    pub reject_reason_text: String,

    /// `content-type` of the rejection response.
    pub reject_content_type: String,

    /// `content-encoding` of the rejection response.
    pub reject_content_encoding: String,
}

impl Default for SizeGuardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_body_bytes: 2 * 1024 * 1024, // 2MB
            reject_status: 413,
            reject_reason_text: "Request entity too large".to_string(),
            reject_content_type: "text/plain".to_string(),
            reject_content_encoding: "identity".to_string(),
        }
    }
}

/// What a publisher does when its lane is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackpressurePolicy {
    /// Wait for capacity, at most `publish_timeout_ms`.
    Block,
    /// Fail immediately.
    Reject,
}

/// Event handoff channel configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// One queue for every connection. When false, each connection is bound
    /// to one of `lanes` dedicated queues.
    pub shared: bool,

    /// Number of physical queues when not shared.
    pub lanes: usize,

    /// Capacity of each queue.
    pub capacity: usize,

    /// Behaviour on a full queue.
    pub backpressure: BackpressurePolicy,

    /// Longest a `block` publish may wait, in milliseconds.
    pub publish_timeout_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            shared: true,
            lanes: 4,
            capacity: 1024,
            backpressure: BackpressurePolicy::Block,
            publish_timeout_ms: 50,
        }
    }
}

/// Consumer worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Tasks draining each queue.
    pub workers_per_lane: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { workers_per_lane: 4 }
    }
}

/// Shared upstream pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Idle handles kept per route once their inbound connection closes.
    pub max_idle_per_route: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            max_idle_per_route: 8,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed for open connections and workers to finish on shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
