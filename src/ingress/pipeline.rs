//! Process-wide collaborators shared by every connection context.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::IngressConfig;
use crate::handoff::{HandoffChannel, LaneReceiver};
use crate::ingress::context::{ConnectionContext, ConnectionDriver, ConnectionEndpoints, TransportLink};
use crate::ingress::hooks::{IngressHooks, NoopHooks};
use crate::ingress::size_guard::{SizeGuard, SizeGuardError};
use crate::net::{ConnectionInfo, ConnectionTracker};
use crate::upstream::{ConnectionLink, UpstreamPool};

/// Fragments buffered between the transport and a busy driver.
const EVENT_BUFFER: usize = 32;
/// Registry commands buffered per connection.
const COMMAND_BUFFER: usize = 16;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid size guard configuration: {0}")]
    SizeGuard(#[from] SizeGuardError),
}

struct PipelineInner {
    size_guard: SizeGuard,
    channel: HandoffChannel,
    hooks: Arc<dyn IngressHooks>,
    pool: Arc<dyn UpstreamPool>,
    tracker: ConnectionTracker,
}

/// Immutable after construction; cloned into every connection.
///
/// The handoff lanes stay open while any clone is alive.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<PipelineInner>,
}

impl Pipeline {
    /// Build the pipeline and the consuming ends of its handoff lanes.
    pub fn new(
        config: &IngressConfig,
        pool: Arc<dyn UpstreamPool>,
    ) -> Result<(Self, Vec<LaneReceiver>), PipelineError> {
        Self::with_hooks(config, pool, Arc::new(NoopHooks))
    }

    pub fn with_hooks(
        config: &IngressConfig,
        pool: Arc<dyn UpstreamPool>,
        hooks: Arc<dyn IngressHooks>,
    ) -> Result<(Self, Vec<LaneReceiver>), PipelineError> {
        let size_guard = SizeGuard::new(&config.size_guard)?;
        let (channel, receivers) = HandoffChannel::new(&config.channel);

        let pipeline = Self {
            inner: Arc::new(PipelineInner {
                size_guard,
                channel,
                hooks,
                pool,
                tracker: ConnectionTracker::new(),
            }),
        };
        Ok((pipeline, receivers))
    }

    /// Connection-active: create the context for a new connection.
    ///
    /// The caller becomes the connection's execution context and must feed it
    /// fragments sequentially.
    pub fn connect(
        &self,
        remote: SocketAddr,
        local: SocketAddr,
    ) -> (ConnectionContext, ConnectionEndpoints) {
        let info = ConnectionInfo::new(remote, local);
        let (outbound, responses) = mpsc::unbounded_channel();
        let (command_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let context = ConnectionContext::new(
            info,
            outbound,
            ConnectionLink::new(command_tx),
            self.clone(),
        );
        (context, ConnectionEndpoints { responses, commands })
    }

    /// Connection-active, with the context moved into a [`ConnectionDriver`].
    /// Spawn [`ConnectionDriver::run`] and talk to it through the [`TransportLink`].
    pub fn open_connection(
        &self,
        remote: SocketAddr,
        local: SocketAddr,
    ) -> (ConnectionDriver, TransportLink) {
        let (context, endpoints) = self.connect(remote, local);
        let (events_tx, events) = mpsc::channel(EVENT_BUFFER);
        let driver = ConnectionDriver::new(context, events, endpoints.commands);
        (driver, TransportLink::new(events_tx, endpoints.responses))
    }

    pub fn size_guard(&self) -> &SizeGuard {
        &self.inner.size_guard
    }

    pub fn channel(&self) -> &HandoffChannel {
        &self.inner.channel
    }

    pub fn hooks(&self) -> &dyn IngressHooks {
        self.inner.hooks.as_ref()
    }

    pub fn upstream_pool(&self) -> &dyn UpstreamPool {
        self.inner.pool.as_ref()
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.inner.tracker
    }
}
