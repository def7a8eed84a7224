//! Extension points around the ingress path.

use uuid::Uuid;

use crate::ingress::message::InboundMessage;
use crate::ingress::response::OutboundResponse;
use crate::net::ConnectionInfo;

/// Result of the admission check made when a request starts.
#[derive(Debug)]
pub enum Admission {
    Continue,
    /// Answer now. The rest of the body is consumed but never handed off.
    Respond(OutboundResponse),
}

/// Callbacks run on the connection's own execution context.
///
/// Every method has a no-op default. Implementations must not block.
pub trait IngressHooks: Send + Sync {
    fn connection_opened(&self, _connection: &ConnectionInfo) {}

    fn connection_closed(&self, _connection: &ConnectionInfo) {}

    /// The head of a request has arrived; the body has not.
    fn request_received(&self, _message: &InboundMessage) {}

    fn admit(&self, _message: &InboundMessage) -> Admission {
        Admission::Continue
    }

    /// The message was accepted by the handoff channel.
    fn request_handed_off(&self, _connection: &ConnectionInfo, _request_id: Uuid) {}
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl IngressHooks for NoopHooks {}
