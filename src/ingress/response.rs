//! Responses and the single-shot handle used to deliver them.

use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::observability::metrics;

/// A response on its way back to the client.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl OutboundResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Plain-text response with a matching `content-length`.
    pub fn text(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self::new(status)
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))
            .with_body(body)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the body and its `content-length`.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self.headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from(self.body.len()));
        self
    }
}

/// Why a delivery did not reach the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("a response was already delivered for this request")]
    AlreadyDelivered,
    #[error("the inbound connection is closed")]
    ConnectionClosed,
}

/// Delivers exactly one response for one request.
///
/// Bound to the outbound write path of the connection the request arrived
/// on. A second delivery attempt fails with [`DeliveryError::AlreadyDelivered`].
/// Dropping a handle that never delivered sends `500 Request dropped`, so the
/// client is always answered.
#[derive(Debug)]
pub struct ResponseHandle {
    request_id: Uuid,
    outbound: Option<mpsc::UnboundedSender<OutboundResponse>>,
}

impl ResponseHandle {
    pub(crate) fn new(request_id: Uuid, outbound: mpsc::UnboundedSender<OutboundResponse>) -> Self {
        Self {
            request_id,
            outbound: Some(outbound),
        }
    }

    pub fn deliver(&mut self, response: OutboundResponse) -> Result<(), DeliveryError> {
        let outbound = self.outbound.take().ok_or(DeliveryError::AlreadyDelivered)?;
        tracing::debug!(
            request_id = %self.request_id,
            status = response.status.as_u16(),
            "Delivering response"
        );
        outbound
            .send(response)
            .map_err(|_| DeliveryError::ConnectionClosed)
    }

    pub fn is_delivered(&self) -> bool {
        self.outbound.is_none()
    }
}

impl Drop for ResponseHandle {
    fn drop(&mut self) {
        let Some(outbound) = self.outbound.take() else {
            return;
        };
        metrics::record_unanswered_dropped();
        let fallback = OutboundResponse::text(StatusCode::INTERNAL_SERVER_ERROR, "Request dropped");
        if outbound.send(fallback).is_ok() {
            tracing::warn!(request_id = %self.request_id, "Request dropped without a response, answering 500");
        }
    }
}
