//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → Upstream pool → Pipeline + lanes → Workers → Listener → Accept loop
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain connections → Close lanes → Join workers
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: consumers run before the listener accepts traffic
//! - Ordered shutdown: stop accept, drain, close
//! - Draining and worker shutdown are both bounded by the grace period

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
pub use startup::{start, start_with_hooks, Ingress, StartupError};
