//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the upstream pool, pipeline and handoff lanes from configuration
//! - Start the consumer workers before any traffic arrives
//! - Bind the listener and spawn the accept loop
//! - Tear everything down in order on shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when consumers are ready)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::IngressConfig;
use crate::handoff::{MessageProcessor, WorkerPool};
use crate::http::IngressServer;
use crate::ingress::{IngressHooks, NoopHooks, Pipeline, PipelineError};
use crate::lifecycle::shutdown::Shutdown;
use crate::net::{Listener, ListenerError};
use crate::upstream::IdlePool;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// A running ingress: accept loop, connections and workers.
pub struct Ingress {
    local_addr: SocketAddr,
    pipeline: Pipeline,
    server: JoinHandle<Result<(), ListenerError>>,
    workers: WorkerPool,
    shutdown: Shutdown,
    grace: Duration,
}

pub async fn start<P: MessageProcessor>(
    config: &IngressConfig,
    processor: Arc<P>,
) -> Result<Ingress, StartupError> {
    start_with_hooks(config, processor, Arc::new(NoopHooks)).await
}

pub async fn start_with_hooks<P: MessageProcessor>(
    config: &IngressConfig,
    processor: Arc<P>,
    hooks: Arc<dyn IngressHooks>,
) -> Result<Ingress, StartupError> {
    let pool = Arc::new(IdlePool::new(&config.upstream));
    let (pipeline, receivers) = Pipeline::with_hooks(config, pool, hooks)?;
    let workers = WorkerPool::spawn(receivers, config.workers.workers_per_lane, processor);

    let listener = Listener::bind(&config.listener).await?;
    let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

    let shutdown = Shutdown::new();
    let server = tokio::spawn(IngressServer::new(pipeline.clone()).run(listener, shutdown.subscribe()));

    tracing::info!(
        address = %local_addr,
        workers = workers.len(),
        lanes = pipeline.channel().lane_count(),
        size_guard = pipeline.size_guard().is_enabled(),
        "Ingress started"
    );

    Ok(Ingress {
        local_addr,
        pipeline,
        server,
        workers,
        shutdown,
        grace: Duration::from_secs(config.timeouts.shutdown_grace_secs),
    })
}

impl Ingress {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Handle for requesting shutdown from another task.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Trigger shutdown and wait for it to complete.
    pub async fn stop(self) -> Result<(), ListenerError> {
        self.shutdown.trigger();
        self.wait().await
    }

    /// Wait for the accept loop to stop, then drain connections and workers.
    pub async fn wait(self) -> Result<(), ListenerError> {
        let result = match self.server.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "Accept loop panicked");
                Ok(())
            }
        };

        let tracker = self.pipeline.tracker();
        if !tracker.wait_for_drain(self.grace).await {
            tracing::warn!(
                remaining = tracker.active_count(),
                grace_secs = self.grace.as_secs(),
                "Connections still open after grace period"
            );
        }

        // Lanes close once the last pipeline clone is gone.
        drop(self.pipeline);
        if tokio::time::timeout(self.grace, self.workers.join())
            .await
            .is_err()
        {
            tracing::warn!("Workers still busy after grace period");
        }

        tracing::info!("Shutdown complete");
        result
    }
}
