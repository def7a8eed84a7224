//! Inbound request ingestion.
//!
//! # Data Flow
//! ```text
//! Transport fragments (head, chunk*, end)
//!     → context.rs (connection's execution context)
//!     → assembler.rs (one message in flight per connection)
//!     → hooks.rs (admission check when a request starts)
//!     → size_guard.rs (on completion: accept or reject)
//!     → handoff channel (accepted) | response handle (rejected)
//! ```
//!
//! # Design Decisions
//! - Per-connection state has a single owner and no locks
//! - A message is handed off only when complete, never partially
//! - Every request that is not handed off is answered exactly once

pub mod assembler;
pub mod context;
pub mod fragment;
pub mod hooks;
pub mod message;
pub mod pipeline;
pub mod response;
pub mod size_guard;

#[cfg(test)]
mod tests;

pub use assembler::{AssemblyOutcome, MessageAssembler};
pub use context::{
    CloseReason, ConnectionContext, ConnectionDriver, ConnectionEndpoints, Disposition,
    DriverStopped, TransportEvent, TransportLink,
};
pub use fragment::{Fragment, RequestHead};
pub use hooks::{Admission, IngressHooks, NoopHooks};
pub use message::{InboundMessage, LaneTag};
pub use pipeline::{Pipeline, PipelineError};
pub use response::{DeliveryError, OutboundResponse, ResponseHandle};
pub use size_guard::{SizeGuard, SizeGuardError, Verdict};
