//! Per-connection message assembly.
//!
//! # State Machine
//! ```text
//! Idle ──head──▶ Assembling ──chunk──▶ Assembling
//!                    │  ▲
//!                    │  └──head── (stale message discarded)
//!                    └──end──▶ Completed (message handed to the caller) ──▶ Idle
//!
//! Idle ──chunk/end──▶ Idle (fragment dropped)
//! ```
//!
//! # Design Decisions
//! - Exactly one message in flight per connection
//! - Chunks are appended as received: no re-chunking, no trimming
//! - No I/O here; the caller decides what a completed message becomes

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::ingress::fragment::{Fragment, RequestHead};
use crate::ingress::message::InboundMessage;
use crate::ingress::response::OutboundResponse;
use crate::net::ConnectionInfo;
use crate::observability::metrics;
use crate::upstream::ConnectionLink;

/// What a fragment did to the assembler.
#[derive(Debug)]
pub enum AssemblyOutcome {
    /// A new message was started.
    Started,
    /// A new message was started and an incomplete one was thrown away.
    Replaced { stale: InboundMessage },
    /// A chunk was appended to the message in flight.
    Appended,
    /// No message was in flight; the fragment was ignored.
    Dropped,
    /// The end marker arrived; the message is complete.
    Completed(InboundMessage),
}

#[derive(Debug)]
pub struct MessageAssembler {
    connection: ConnectionInfo,
    outbound: mpsc::UnboundedSender<OutboundResponse>,
    link: ConnectionLink,
    current: Option<InboundMessage>,
}

impl MessageAssembler {
    /// `outbound` is the connection's write path; every message gets a
    /// response handle bound to it.
    pub fn new(
        connection: ConnectionInfo,
        outbound: mpsc::UnboundedSender<OutboundResponse>,
        link: ConnectionLink,
    ) -> Self {
        Self {
            connection,
            outbound,
            link,
            current: None,
        }
    }

    pub fn accept(&mut self, fragment: Fragment) -> AssemblyOutcome {
        match fragment {
            Fragment::Head(head) => self.start(head),
            Fragment::Chunk(chunk) => self.append(chunk),
            Fragment::End(last) => self.finish(last),
        }
    }

    pub fn in_flight(&self) -> Option<&InboundMessage> {
        self.current.as_ref()
    }

    pub fn in_flight_mut(&mut self) -> Option<&mut InboundMessage> {
        self.current.as_mut()
    }

    /// Drop the message in flight, if any. Used when the connection goes away.
    pub fn discard(&mut self) -> Option<InboundMessage> {
        self.current.take()
    }

    fn start(&mut self, head: RequestHead) -> AssemblyOutcome {
        let message = InboundMessage::new(
            self.connection,
            head,
            self.outbound.clone(),
            self.link.clone(),
        );
        tracing::debug!(
            connection_id = %self.connection.id,
            request_id = %message.id(),
            method = %message.method(),
            target = %message.target(),
            "Request started"
        );

        match self.current.replace(message) {
            None => AssemblyOutcome::Started,
            Some(stale) => {
                // Most recent start wins.
                tracing::warn!(
                    connection_id = %self.connection.id,
                    stale_request_id = %stale.id(),
                    stale_body_bytes = stale.body_len(),
                    "New request started before previous one completed, discarding previous"
                );
                metrics::record_overlapping_start();
                AssemblyOutcome::Replaced { stale }
            }
        }
    }

    fn append(&mut self, chunk: Bytes) -> AssemblyOutcome {
        match self.current.as_mut() {
            Some(message) => {
                message.push_chunk(chunk);
                AssemblyOutcome::Appended
            }
            None => self.drop_fragment("chunk", chunk.len()),
        }
    }

    fn finish(&mut self, last: Bytes) -> AssemblyOutcome {
        let Some(mut message) = self.current.take() else {
            return self.drop_fragment("end", last.len());
        };
        if !last.is_empty() {
            message.push_chunk(last);
        }
        message.mark_complete();
        metrics::record_body_size(message.body_len());
        tracing::debug!(
            connection_id = %self.connection.id,
            request_id = %message.id(),
            body_bytes = message.body_len(),
            "Request complete"
        );
        AssemblyOutcome::Completed(message)
    }

    fn drop_fragment(&self, kind: &'static str, len: usize) -> AssemblyOutcome {
        tracing::debug!(
            connection_id = %self.connection.id,
            fragment = kind,
            bytes = len,
            "No request in flight, dropping fragment"
        );
        metrics::record_fragment_dropped();
        AssemblyOutcome::Dropped
    }
}
