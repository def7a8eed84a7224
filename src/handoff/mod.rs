//! Event handoff subsystem.
//!
//! # Data Flow
//! ```text
//! Connection context (completed, accepted message)
//!     → channel.rs (Publisher bound to one lane, backpressure policy)
//!     → lane queue (bounded)
//!     → workers.rs (WorkerPool → MessageProcessor)
//!     → summary.rs (default processor: JSON description of the request)
//! ```
//!
//! # Design Decisions
//! - The producer's contract ends at a successful enqueue
//! - Publishing never waits longer than the configured tolerance
//! - Lanes close when the channel and every publisher are dropped

pub mod channel;
pub mod summary;
pub mod workers;

pub use channel::{HandoffChannel, LaneReceiver, PublishError, Publisher};
pub use summary::{RequestSummary, SummaryProcessor};
pub use workers::{MessageProcessor, WorkerPool};
