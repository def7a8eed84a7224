//! Maximum body size enforcement.
//!
//! # Responsibilities
//! - Decide whether a completed message's body is within the configured bound
//! - Build the rejection response sent in place of a handoff
//!
//! # Design Decisions
//! - Only body bytes count; header size limits belong elsewhere
//! - A body exactly at the limit is accepted
//! - The rejection response is built once at startup and cloned per use

use http::{header, HeaderValue, StatusCode};
use thiserror::Error;

use crate::config::SizeGuardConfig;
use crate::ingress::message::InboundMessage;
use crate::ingress::response::OutboundResponse;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SizeGuardError {
    #[error("reject status {0} is not a valid HTTP status")]
    InvalidStatus(u16),
    #[error("{0} is not a valid header value")]
    InvalidHeader(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accept,
    Reject(OutboundResponse),
}

#[derive(Debug, Clone)]
pub struct SizeGuard {
    enabled: bool,
    max_body_bytes: usize,
    rejection: OutboundResponse,
}

impl SizeGuard {
    pub fn new(config: &SizeGuardConfig) -> Result<Self, SizeGuardError> {
        let status = StatusCode::from_u16(config.reject_status)
            .map_err(|_| SizeGuardError::InvalidStatus(config.reject_status))?;
        let content_type = HeaderValue::from_str(&config.reject_content_type)
            .map_err(|_| SizeGuardError::InvalidHeader("reject_content_type"))?;
        let content_encoding = HeaderValue::from_str(&config.reject_content_encoding)
            .map_err(|_| SizeGuardError::InvalidHeader("reject_content_encoding"))?;

        let rejection = OutboundResponse::new(status)
            .with_header(header::CONNECTION, HeaderValue::from_static("keep-alive"))
            .with_header(header::CONTENT_ENCODING, content_encoding)
            .with_header(header::CONTENT_TYPE, content_type)
            .with_body(config.reject_reason_text.clone());

        Ok(Self {
            enabled: config.enabled,
            max_body_bytes: config.max_body_bytes,
            rejection,
        })
    }

    pub fn evaluate(&self, message: &InboundMessage) -> Verdict {
        self.evaluate_len(message.body_len())
    }

    pub fn evaluate_len(&self, body_len: usize) -> Verdict {
        if !self.enabled || body_len <= self.max_body_bytes {
            Verdict::Accept
        } else {
            Verdict::Reject(self.rejection.clone())
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }
}
