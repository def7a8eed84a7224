//! Processor that answers every request with a JSON description of what arrived.

use bytes::Bytes;
use http::{header, HeaderValue, StatusCode};
use serde::Serialize;
use uuid::Uuid;

use crate::handoff::workers::MessageProcessor;
use crate::ingress::{InboundMessage, OutboundResponse};

/// Body of the summary response.
#[derive(Debug, Serialize)]
pub struct RequestSummary {
    pub request_id: Uuid,
    pub connection_id: String,
    pub remote: String,
    pub method: String,
    pub target: String,
    pub body_bytes: usize,
    pub body_chunks: usize,
    pub lane: Option<usize>,
    pub shared_lane: Option<bool>,
}

impl RequestSummary {
    pub fn of(message: &InboundMessage) -> Self {
        let lane = message.lane();
        Self {
            request_id: message.id(),
            connection_id: message.connection().id.to_string(),
            remote: message.connection().remote.to_string(),
            method: message.method().to_string(),
            target: message.target().to_string(),
            body_bytes: message.body_len(),
            body_chunks: message.body_chunks().len(),
            lane: lane.map(|tag| tag.index),
            shared_lane: lane.map(|tag| tag.shared),
        }
    }
}

#[derive(Debug, Default)]
pub struct SummaryProcessor;

impl MessageProcessor for SummaryProcessor {
    async fn process(&self, mut message: InboundMessage) {
        let summary = RequestSummary::of(&message);
        let response = match serde_json::to_vec(&summary) {
            Ok(json) => OutboundResponse::new(StatusCode::OK)
                .with_header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .with_body(Bytes::from(json)),
            Err(e) => {
                tracing::error!(request_id = %summary.request_id, error = %e, "Failed to encode summary");
                OutboundResponse::text(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
        };

        if let Err(e) = message.respond(response) {
            tracing::debug!(request_id = %summary.request_id, error = %e, "Summary not delivered");
        }
    }
}
