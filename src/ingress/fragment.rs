//! Protocol fragments delivered by the transport, one connection at a time.

use bytes::Bytes;
use http::{request, HeaderMap, Method, Version};

/// Request line and headers of one inbound request.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    /// Request target exactly as received (origin or absolute form).
    pub target: String,
    pub version: Version,
    pub headers: HeaderMap,
}

impl RequestHead {
    pub fn new(method: Method, target: impl Into<String>, version: Version) -> Self {
        Self {
            method,
            target: target.into(),
            version,
            headers: HeaderMap::new(),
        }
    }

    /// Copy the head out of a parsed request.
    pub fn from_parts(parts: &request::Parts) -> Self {
        Self {
            method: parts.method.clone(),
            target: parts.uri.to_string(),
            version: parts.version,
            headers: parts.headers.clone(),
        }
    }
}

/// One unit of a streamed inbound request.
#[derive(Debug, Clone)]
pub enum Fragment {
    /// Start of a new request.
    Head(RequestHead),
    /// A body chunk, in arrival order.
    Chunk(Bytes),
    /// End of the request. May carry the final chunk.
    End(Bytes),
}

impl Fragment {
    pub fn kind(&self) -> &'static str {
        match self {
            Fragment::Head(_) => "head",
            Fragment::Chunk(_) => "chunk",
            Fragment::End(_) => "end",
        }
    }
}
