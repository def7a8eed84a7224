//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacities > 0, status codes, header values)
//! - Validate addresses before anything is bound
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: IngressConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use http::HeaderValue;
use thiserror::Error;

use crate::config::schema::{BackpressurePolicy, IngressConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    InvalidBindAddress(String),

    #[error("listener.max_connections must be greater than zero")]
    ZeroMaxConnections,

    #[error("size_guard.reject_status {0} is not a valid HTTP status")]
    InvalidRejectStatus(u16),

    #[error("size_guard.reject_content_type must not be empty")]
    EmptyRejectContentType,

    #[error("size_guard.{0} is not a valid header value")]
    InvalidHeaderValue(&'static str),

    #[error("channel.capacity must be greater than zero")]
    ZeroCapacity,

    #[error("channel.lanes must be greater than zero")]
    ZeroLanes,

    #[error("channel.publish_timeout_ms must be greater than zero for the block policy")]
    ZeroPublishTimeout,

    #[error("workers.workers_per_lane must be greater than zero")]
    ZeroWorkers,

    #[error("observability.metrics_address '{0}' is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Check an `IngressConfig` for semantic errors.
pub fn validate_config(config: &IngressConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }

    let guard = &config.size_guard;
    if !(100..=599).contains(&guard.reject_status) {
        errors.push(ValidationError::InvalidRejectStatus(guard.reject_status));
    }
    if guard.reject_content_type.is_empty() {
        errors.push(ValidationError::EmptyRejectContentType);
    } else if HeaderValue::from_str(&guard.reject_content_type).is_err() {
        errors.push(ValidationError::InvalidHeaderValue("reject_content_type"));
    }
    if HeaderValue::from_str(&guard.reject_content_encoding).is_err() {
        errors.push(ValidationError::InvalidHeaderValue("reject_content_encoding"));
    }

    let channel = &config.channel;
    if channel.capacity == 0 {
        errors.push(ValidationError::ZeroCapacity);
    }
    if !channel.shared && channel.lanes == 0 {
        errors.push(ValidationError::ZeroLanes);
    }
    if channel.backpressure == BackpressurePolicy::Block && channel.publish_timeout_ms == 0 {
        errors.push(ValidationError::ZeroPublishTimeout);
    }

    if config.workers.workers_per_lane == 0 {
        errors.push(ValidationError::ZeroWorkers);
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
