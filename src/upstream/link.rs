//! Access to a connection's route registry from outside its execution context.
//!
//! The registry has a single owner, the connection driver. Consumers that hold
//! a message send commands to that driver and await the answer.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::upstream::registry::UpstreamHandle;
use crate::upstream::route::RouteKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("the inbound connection is closed")]
    ConnectionClosed,
}

/// Registry operation executed by the connection driver.
#[derive(Debug)]
pub enum RegistryCommand {
    Get {
        route: RouteKey,
        reply: oneshot::Sender<Option<UpstreamHandle>>,
    },
    Put {
        route: RouteKey,
        handle: UpstreamHandle,
        reply: oneshot::Sender<Option<UpstreamHandle>>,
    },
    Remove {
        route: RouteKey,
        reply: oneshot::Sender<Option<UpstreamHandle>>,
    },
}

/// Cloneable handle to the route registry of one inbound connection.
#[derive(Debug, Clone)]
pub struct ConnectionLink {
    commands: mpsc::Sender<RegistryCommand>,
}

impl ConnectionLink {
    pub fn new(commands: mpsc::Sender<RegistryCommand>) -> Self {
        Self { commands }
    }

    /// Upstream handle registered for `route`, if any.
    pub async fn get(&self, route: RouteKey) -> Result<Option<UpstreamHandle>, LinkError> {
        self.call(|reply| RegistryCommand::Get { route, reply }).await
    }

    /// Register `handle` for `route`. Returns the replaced handle, which the caller must close.
    pub async fn put(
        &self,
        route: RouteKey,
        handle: UpstreamHandle,
    ) -> Result<Option<UpstreamHandle>, LinkError> {
        self.call(|reply| RegistryCommand::Put {
            route,
            handle,
            reply,
        })
        .await
    }

    pub async fn remove(&self, route: RouteKey) -> Result<Option<UpstreamHandle>, LinkError> {
        self.call(|reply| RegistryCommand::Remove { route, reply })
            .await
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn call(
        &self,
        command: impl FnOnce(oneshot::Sender<Option<UpstreamHandle>>) -> RegistryCommand,
    ) -> Result<Option<UpstreamHandle>, LinkError> {
        let (reply, answer) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| LinkError::ConnectionClosed)?;
        answer.await.map_err(|_| LinkError::ConnectionClosed)
    }
}
