//! Per-connection state and the task that owns it.
//!
//! # Responsibilities
//! - Run each fragment through assembly, admission, size guard and handoff
//! - Answer every completed request exactly once when it is not handed off
//! - Serve route registry commands for consumers holding this connection's messages
//! - Clean up on connection-inactive: drop the message in flight, release upstreams
//!
//! # Design Decisions
//! - One owner: the driver task is the connection's only execution context
//! - Publishing is the only point where the driver may wait, and registry
//!   commands are still served while it does

use std::sync::Arc;

use http::StatusCode;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

use crate::handoff::{PublishError, Publisher};
use crate::ingress::assembler::{AssemblyOutcome, MessageAssembler};
use crate::ingress::fragment::Fragment;
use crate::ingress::hooks::Admission;
use crate::ingress::message::InboundMessage;
use crate::ingress::pipeline::Pipeline;
use crate::ingress::response::OutboundResponse;
use crate::ingress::size_guard::Verdict;
use crate::net::{ConnectionGuard, ConnectionInfo};
use crate::observability::metrics;
use crate::upstream::{ConnectionLink, RegistryCommand, RouteRegistry};

/// Why a connection went inactive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Orderly close by either side.
    Closed,
    /// I/O or protocol error reported by the transport.
    Fault(String),
}

/// Event from the transport runtime.
#[derive(Debug)]
pub enum TransportEvent {
    Fragment(Fragment),
    Inactive(CloseReason),
}

/// What became of one fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Absorbed into the message in flight.
    Pending,
    /// No message in flight; ignored.
    Dropped,
    /// Message complete and handed off.
    Published,
    /// Message complete and answered with the size rejection.
    Rejected,
    /// Message complete but already answered at admission.
    Answered,
    /// Message complete, handoff failed; answered with 503.
    Failed(&'static str),
}

/// Everything owned by one inbound connection.
pub struct ConnectionContext {
    info: ConnectionInfo,
    assembler: MessageAssembler,
    routes: RouteRegistry,
    publisher: Publisher,
    pipeline: Pipeline,
    _guard: ConnectionGuard,
}

impl ConnectionContext {
    pub(crate) fn new(
        info: ConnectionInfo,
        outbound: mpsc::UnboundedSender<OutboundResponse>,
        link: ConnectionLink,
        pipeline: Pipeline,
    ) -> Self {
        let guard = pipeline.tracker().track(info.id);
        let publisher = pipeline.channel().bind();
        tracing::debug!(
            connection_id = %info.id,
            remote = %info.remote,
            local = %info.local,
            lane = publisher.lane(),
            "Connection active"
        );
        pipeline.hooks().connection_opened(&info);

        Self {
            info,
            assembler: MessageAssembler::new(info, outbound, link),
            routes: RouteRegistry::new(),
            publisher,
            pipeline,
            _guard: guard,
        }
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    pub fn routes(&self) -> &RouteRegistry {
        &self.routes
    }

    pub fn routes_mut(&mut self) -> &mut RouteRegistry {
        &mut self.routes
    }

    pub fn in_flight(&self) -> Option<&InboundMessage> {
        self.assembler.in_flight()
    }

    /// Lane this connection publishes into.
    pub fn lane(&self) -> usize {
        self.publisher.lane()
    }

    pub async fn on_fragment(&mut self, fragment: Fragment) -> Disposition {
        self.process(fragment, None).await
    }

    /// With `commands`, registry commands keep being served while a publish waits for room.
    async fn process(
        &mut self,
        fragment: Fragment,
        commands: Option<&mut mpsc::Receiver<RegistryCommand>>,
    ) -> Disposition {
        match self.assembler.accept(fragment) {
            AssemblyOutcome::Started => {
                self.admit_in_flight();
                Disposition::Pending
            }
            AssemblyOutcome::Replaced { stale } => {
                drop(stale);
                self.admit_in_flight();
                Disposition::Pending
            }
            AssemblyOutcome::Appended => Disposition::Pending,
            AssemblyOutcome::Dropped => Disposition::Dropped,
            AssemblyOutcome::Completed(message) => self.complete(message, commands).await,
        }
    }

    fn admit_in_flight(&mut self) {
        let Some(message) = self.assembler.in_flight_mut() else {
            return;
        };
        let hooks = self.pipeline.hooks();
        hooks.request_received(message);

        if let Admission::Respond(response) = hooks.admit(message) {
            tracing::info!(
                connection_id = %self.info.id,
                request_id = %message.id(),
                status = response.status.as_u16(),
                "Request answered at admission"
            );
            metrics::record_admission_veto();
            if let Err(e) = message.respond(response) {
                tracing::warn!(request_id = %message.id(), error = %e, "Admission response not delivered");
            }
        }
    }

    async fn complete(
        &mut self,
        mut message: InboundMessage,
        commands: Option<&mut mpsc::Receiver<RegistryCommand>>,
    ) -> Disposition {
        if message.is_answered() {
            tracing::debug!(request_id = %message.id(), "Request already answered, not handing off");
            return Disposition::Answered;
        }

        match self.pipeline.size_guard().evaluate(&message) {
            Verdict::Reject(rejection) => {
                tracing::info!(
                    connection_id = %self.info.id,
                    request_id = %message.id(),
                    body_bytes = message.body_len(),
                    max_body_bytes = self.pipeline.size_guard().max_body_bytes(),
                    "Request body too large, rejecting"
                );
                metrics::record_size_rejection();
                if let Err(e) = message.respond(rejection) {
                    tracing::warn!(request_id = %message.id(), error = %e, "Rejection not delivered");
                }
                Disposition::Rejected
            }
            Verdict::Accept => {
                let request_id = message.id();
                match self.hand_off(message, commands).await {
                    Ok(()) => {
                        tracing::trace!(request_id = %request_id, lane = self.publisher.lane(), "Request handed off");
                        self.pipeline
                            .hooks()
                            .request_handed_off(&self.info, request_id);
                        Disposition::Published
                    }
                    Err(err) => {
                        let reason = err.reason();
                        tracing::warn!(
                            connection_id = %self.info.id,
                            request_id = %request_id,
                            error = %err,
                            "Handoff failed, answering 503"
                        );
                        metrics::record_publish_failure(reason);
                        let mut message = err.into_message();
                        let busy = OutboundResponse::text(
                            StatusCode::SERVICE_UNAVAILABLE,
                            "Server busy, retry later",
                        );
                        if let Err(e) = message.respond(busy) {
                            tracing::warn!(request_id = %request_id, error = %e, "Busy response not delivered");
                        }
                        Disposition::Failed(reason)
                    }
                }
            }
        }
    }

    async fn hand_off(
        &mut self,
        message: InboundMessage,
        commands: Option<&mut mpsc::Receiver<RegistryCommand>>,
    ) -> Result<(), PublishError> {
        let Some(commands) = commands else {
            return self.publisher.publish(message).await;
        };

        // Consumers of this lane may be waiting on this connection's registry.
        let publish = self.publisher.publish(message);
        tokio::pin!(publish);
        loop {
            tokio::select! {
                result = &mut publish => return result,
                Some(command) = commands.recv() => serve_registry(&mut self.routes, command),
            }
        }
    }

    pub fn on_registry(&mut self, command: RegistryCommand) {
        serve_registry(&mut self.routes, command);
    }

    /// Connection-inactive. Consumes the context, releasing its lane binding.
    pub fn close(mut self, reason: CloseReason) {
        if let Some(message) = self.assembler.discard() {
            tracing::debug!(
                connection_id = %self.info.id,
                request_id = %message.id(),
                body_bytes = message.body_len(),
                "Connection closed mid-request, discarding"
            );
            metrics::record_incomplete_discarded();
        }

        let released = self
            .routes
            .release_all(self.info.id, self.pipeline.upstream_pool());
        self.pipeline.hooks().connection_closed(&self.info);

        match reason {
            CloseReason::Closed => {
                tracing::debug!(connection_id = %self.info.id, released_upstreams = released, "Connection inactive");
            }
            CloseReason::Fault(error) => {
                tracing::warn!(connection_id = %self.info.id, released_upstreams = released, error = %error, "Connection failed");
            }
        }
    }
}

fn serve_registry(routes: &mut RouteRegistry, command: RegistryCommand) {
    // A dropped reply means the caller gave up; nothing to do.
    match command {
        RegistryCommand::Get { route, reply } => {
            let _ = reply.send(routes.get(&route).cloned());
        }
        RegistryCommand::Put {
            route,
            handle,
            reply,
        } => {
            let _ = reply.send(routes.put(route, handle));
        }
        RegistryCommand::Remove { route, reply } => {
            let _ = reply.send(routes.remove(&route));
        }
    }
}

/// Both ends of a connection context handed back by [`Pipeline::connect`].
pub struct ConnectionEndpoints {
    /// The connection's outbound write path.
    pub responses: mpsc::UnboundedReceiver<OutboundResponse>,
    /// Registry commands sent through [`ConnectionLink`]s.
    pub commands: mpsc::Receiver<RegistryCommand>,
}

/// The connection's execution context: a task owning its [`ConnectionContext`].
pub struct ConnectionDriver {
    context: ConnectionContext,
    events: mpsc::Receiver<TransportEvent>,
    commands: mpsc::Receiver<RegistryCommand>,
}

impl ConnectionDriver {
    pub(crate) fn new(
        context: ConnectionContext,
        events: mpsc::Receiver<TransportEvent>,
        commands: mpsc::Receiver<RegistryCommand>,
    ) -> Self {
        Self {
            context,
            events,
            commands,
        }
    }

    /// Process events until the transport reports the connection inactive.
    pub async fn run(mut self) {
        let reason = loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(TransportEvent::Fragment(fragment)) => {
                        let kind = fragment.kind();
                        let disposition = self
                            .context
                            .process(fragment, Some(&mut self.commands))
                            .await;
                        tracing::trace!(connection_id = %self.context.info.id, fragment = kind, ?disposition, "Fragment processed");
                    }
                    Some(TransportEvent::Inactive(reason)) => break reason,
                    None => break CloseReason::Closed,
                },
                Some(command) = self.commands.recv() => self.context.on_registry(command),
            }
        };
        self.context.close(reason);
    }
}

#[derive(Debug, Clone, Copy, Error)]
#[error("connection driver has stopped")]
pub struct DriverStopped;

/// Transport-side handle to a running [`ConnectionDriver`].
#[derive(Clone)]
pub struct TransportLink {
    events: mpsc::Sender<TransportEvent>,
    responses: Arc<Mutex<mpsc::UnboundedReceiver<OutboundResponse>>>,
}

impl TransportLink {
    pub(crate) fn new(
        events: mpsc::Sender<TransportEvent>,
        responses: mpsc::UnboundedReceiver<OutboundResponse>,
    ) -> Self {
        Self {
            events,
            responses: Arc::new(Mutex::new(responses)),
        }
    }

    /// Forward a fragment. Waits while the driver is busy publishing.
    pub async fn send(&self, fragment: Fragment) -> Result<(), DriverStopped> {
        self.events
            .send(TransportEvent::Fragment(fragment))
            .await
            .map_err(|_| DriverStopped)
    }

    /// Next response written to the connection, in delivery order.
    pub async fn next_response(&self) -> Result<OutboundResponse, DriverStopped> {
        self.responses.lock().await.recv().await.ok_or(DriverStopped)
    }

    /// Report connection-inactive. The driver finishes its cleanup and exits.
    pub async fn close(&self, reason: CloseReason) {
        let _ = self.events.send(TransportEvent::Inactive(reason)).await;
    }
}
