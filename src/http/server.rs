//! HTTP server: accept loop and per-connection serving.
//!
//! # Responsibilities
//! - Accept connections from the bounded listener
//! - Drive each connection with hyper's HTTP/1.1 server
//! - Turn every request into head, chunk and end fragments for the connection driver
//! - Write the responses the driver emits, in order
//! - Report connection-inactive once hyper is done with the connection

use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::broadcast;

use crate::http::response::into_http;
use crate::ingress::{CloseReason, DriverStopped, Fragment, Pipeline, RequestHead, TransportLink};
use crate::net::{ConnectionPermit, Listener, ListenerError};

/// Failure while serving a single request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Reading the request body failed.
    #[error("failed to read request body: {0}")]
    Body(#[from] hyper::Error),
    /// The connection driver exited before answering.
    #[error(transparent)]
    Driver(#[from] DriverStopped),
}

/// HTTP/1.1 front end feeding the ingress pipeline.
pub struct IngressServer {
    pipeline: Pipeline,
}

impl IngressServer {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    /// Accept connections until `shutdown` fires.
    ///
    /// Connections already accepted finish their current request and then close.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        let addr = listener.local_addr().map_err(ListenerError::Accept)?;
        tracing::info!(address = %addr, "Ingress server starting");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote, permit)) => {
                        let pipeline = self.pipeline.clone();
                        let shutdown = shutdown.resubscribe();
                        tokio::spawn(serve_connection(pipeline, stream, remote, addr, shutdown, permit));
                    }
                    Err(ListenerError::Accept(e)) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                    }
                    Err(e) => return Err(e),
                },
            }
        }

        tracing::info!("Ingress server stopped");
        Ok(())
    }
}

async fn serve_connection(
    pipeline: Pipeline,
    stream: TcpStream,
    remote: SocketAddr,
    listen_addr: SocketAddr,
    mut shutdown: broadcast::Receiver<()>,
    _permit: ConnectionPermit,
) {
    let local = stream.local_addr().unwrap_or(listen_addr);
    let (driver, transport) = pipeline.open_connection(remote, local);
    let driver = tokio::spawn(driver.run());

    let service = service_fn({
        let transport = transport.clone();
        move |request| serve_request(transport.clone(), request)
    });
    let conn = http1::Builder::new()
        .keep_alive(true)
        .serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let mut draining = false;
    let result = loop {
        tokio::select! {
            result = conn.as_mut() => break result,
            _ = shutdown.recv(), if !draining => {
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    };

    let reason = match result {
        Ok(()) => CloseReason::Closed,
        Err(e) => CloseReason::Fault(e.to_string()),
    };
    transport.close(reason).await;

    if let Err(e) = driver.await {
        tracing::error!(remote = %remote, error = %e, "Connection driver panicked");
    }
}

/// Forward one request to the driver as fragments and wait for its response.
async fn serve_request(
    transport: TransportLink,
    request: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, TransportError> {
    let (parts, mut body) = request.into_parts();
    transport
        .send(Fragment::Head(RequestHead::from_parts(&parts)))
        .await?;

    while let Some(frame) = body.frame().await {
        // Trailers carry no body bytes.
        if let Ok(data) = frame?.into_data() {
            if !data.is_empty() {
                transport.send(Fragment::Chunk(data)).await?;
            }
        }
    }
    transport.send(Fragment::End(Bytes::new())).await?;

    let response = transport.next_response().await?;
    Ok(into_http(response))
}
