//! Metrics collection and exposition.
//!
//! # Metrics
//! - `ingress_active_connections` (gauge): current connection count
//! - `ingress_messages_published_total` (counter): messages handed off, by lane mode
//! - `ingress_size_rejections_total` (counter): messages answered with the size rejection
//! - `ingress_publish_failures_total` (counter): failed handoffs, by reason
//! - `ingress_fragments_dropped_total` (counter): chunks with no message to join
//! - `ingress_overlapping_starts_total` (counter): incomplete messages replaced by a new start
//! - `ingress_incomplete_discarded_total` (counter): incomplete messages lost to a closing connection
//! - `ingress_admission_vetoes_total` (counter): requests answered by an admission hook
//! - `ingress_unanswered_dropped_total` (counter): messages dropped before anyone responded
//! - `ingress_upstream_released_total` (counter): registry handles returned at close, by outcome
//! - `ingress_body_bytes` (histogram): body size of completed messages
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_connection_opened() {
    gauge!("ingress_active_connections").increment(1.0);
}

pub fn record_connection_closed() {
    gauge!("ingress_active_connections").decrement(1.0);
}

pub fn record_published(shared: bool) {
    let mode = if shared { "shared" } else { "dedicated" };
    counter!("ingress_messages_published_total", "mode" => mode).increment(1);
}

pub fn record_size_rejection() {
    counter!("ingress_size_rejections_total").increment(1);
}

pub fn record_publish_failure(reason: &'static str) {
    counter!("ingress_publish_failures_total", "reason" => reason).increment(1);
}

pub fn record_fragment_dropped() {
    counter!("ingress_fragments_dropped_total").increment(1);
}

pub fn record_overlapping_start() {
    counter!("ingress_overlapping_starts_total").increment(1);
}

pub fn record_incomplete_discarded() {
    counter!("ingress_incomplete_discarded_total").increment(1);
}

pub fn record_admission_veto() {
    counter!("ingress_admission_vetoes_total").increment(1);
}

pub fn record_unanswered_dropped() {
    counter!("ingress_unanswered_dropped_total").increment(1);
}

pub fn record_upstream_released(outcome: &'static str) {
    counter!("ingress_upstream_released_total", "outcome" => outcome).increment(1);
}

pub fn record_body_size(bytes: usize) {
    histogram!("ingress_body_bytes").record(bytes as f64);
}
