//! The message under assembly and, once complete, handed to consumers.

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Method, Version};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::ingress::fragment::RequestHead;
use crate::ingress::response::{DeliveryError, OutboundResponse, ResponseHandle};
use crate::net::ConnectionInfo;
use crate::upstream::ConnectionLink;

/// Which physical queue a message was published into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneTag {
    pub index: usize,
    /// The queue is shared by every connection rather than dedicated to a subset.
    pub shared: bool,
}

/// One inbound request.
///
/// The head is fixed at creation. Body chunks are kept exactly as they
/// arrived and can no longer grow once the message is complete.
#[derive(Debug)]
pub struct InboundMessage {
    id: Uuid,
    connection: ConnectionInfo,
    head: RequestHead,
    body: Vec<Bytes>,
    body_len: usize,
    complete: bool,
    lane: Option<LaneTag>,
    response: ResponseHandle,
    link: ConnectionLink,
}

impl InboundMessage {
    pub(crate) fn new(
        connection: ConnectionInfo,
        head: RequestHead,
        outbound: mpsc::UnboundedSender<OutboundResponse>,
        link: ConnectionLink,
    ) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            connection,
            head,
            body: Vec::new(),
            body_len: 0,
            complete: false,
            lane: None,
            response: ResponseHandle::new(id, outbound),
            link,
        }
    }

    /// Request ID, unique per message.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn connection(&self) -> &ConnectionInfo {
        &self.connection
    }

    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    pub fn method(&self) -> &Method {
        &self.head.method
    }

    pub fn target(&self) -> &str {
        &self.head.target
    }

    pub fn version(&self) -> Version {
        self.head.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    /// First value of a header, looked up case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Body chunks in arrival order.
    pub fn body_chunks(&self) -> &[Bytes] {
        &self.body
    }

    pub fn body_len(&self) -> usize {
        self.body_len
    }

    /// The whole body as one buffer.
    pub fn body(&self) -> Bytes {
        match self.body.as_slice() {
            [] => Bytes::new(),
            [only] => only.clone(),
            chunks => {
                let mut joined = BytesMut::with_capacity(self.body_len);
                for chunk in chunks {
                    joined.extend_from_slice(chunk);
                }
                joined.freeze()
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Set once the message has been published.
    pub fn lane(&self) -> Option<LaneTag> {
        self.lane
    }

    /// Answer the client. Only the first call succeeds.
    pub fn respond(&mut self, response: OutboundResponse) -> Result<(), DeliveryError> {
        self.response.deliver(response)
    }

    pub fn is_answered(&self) -> bool {
        self.response.is_delivered()
    }

    /// Route registry of the connection this message arrived on.
    pub fn upstream(&self) -> &ConnectionLink {
        &self.link
    }

    /// Returns `false`, leaving the body untouched, once the message is complete.
    pub(crate) fn push_chunk(&mut self, chunk: Bytes) -> bool {
        if self.complete {
            return false;
        }
        self.body_len += chunk.len();
        self.body.push(chunk);
        true
    }

    pub(crate) fn mark_complete(&mut self) {
        self.complete = true;
    }

    pub(crate) fn set_lane(&mut self, lane: LaneTag) {
        self.lane = Some(lane);
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::detached_message;
    use super::*;
    use http::StatusCode;

    #[test]
    fn body_preserves_chunk_boundaries() {
        let (mut message, _responses, _commands) = detached_message("/upload");
        assert!(message.push_chunk(Bytes::from_static(b"ab")));
        assert!(message.push_chunk(Bytes::new()));
        assert!(message.push_chunk(Bytes::from_static(b"cd")));

        assert_eq!(message.body_chunks().len(), 3);
        assert_eq!(message.body_len(), 4);
        assert_eq!(message.body(), Bytes::from_static(b"abcd"));
    }

    #[test]
    fn complete_message_rejects_chunks() {
        let (mut message, _responses, _commands) = detached_message("/upload");
        message.push_chunk(Bytes::from_static(b"ab"));
        message.mark_complete();

        assert!(!message.push_chunk(Bytes::from_static(b"cd")));
        assert_eq!(message.body(), Bytes::from_static(b"ab"));
    }

    #[test]
    fn headers_are_case_insensitive() {
        let (outbound, _responses) = mpsc::unbounded_channel();
        let (commands, _command_rx) = mpsc::channel(1);
        let mut head = RequestHead::new(Method::GET, "/", Version::HTTP_11);
        head.headers.insert("content-type", "application/json".parse().unwrap());
        let message = InboundMessage::new(
            ConnectionInfo::new("127.0.0.1:1".parse().unwrap(), "127.0.0.1:2".parse().unwrap()),
            head,
            outbound,
            ConnectionLink::new(commands),
        );

        assert_eq!(message.header("Content-Type"), Some("application/json"));
        assert_eq!(message.header("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(message.header("accept"), None);
    }

    #[test]
    fn respond_reaches_connection_once() {
        let (mut message, mut responses, _commands) = detached_message("/");
        message.respond(OutboundResponse::new(StatusCode::NO_CONTENT)).unwrap();
        assert!(message.is_answered());
        assert!(message.respond(OutboundResponse::new(StatusCode::OK)).is_err());
        assert_eq!(responses.try_recv().unwrap().status, StatusCode::NO_CONTENT);
    }
}
