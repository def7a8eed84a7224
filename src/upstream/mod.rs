//! Upstream connection reuse.
//!
//! # Data Flow
//! ```text
//! Consumer holding a message
//!     → link.rs (command to the owning connection driver)
//!     → registry.rs (route → handle, one per route per inbound connection)
//!
//! Inbound connection closes
//!     → registry.rs (release every handle)
//!     → pool.rs (keep idle handles per route, evict surplus)
//! ```

pub mod link;
pub mod pool;
pub mod registry;
pub mod route;

pub use link::{ConnectionLink, LinkError, RegistryCommand};
pub use pool::{IdlePool, UpstreamPool};
pub use registry::{RouteRegistry, UpstreamHandle, UpstreamId};
pub use route::{RouteError, RouteKey};
