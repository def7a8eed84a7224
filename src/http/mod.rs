//! HTTP/1.1 transport adapter.
//!
//! # Data Flow
//! ```text
//! TCP connection (net::Listener)
//!     → server.rs (hyper connection, one driver task per connection)
//!     → request head, body frames, end of request → Fragment
//!     → ingress::ConnectionDriver
//!     → response.rs (OutboundResponse → hyper Response)
//!     → Send to client
//! ```
//!
//! # Design Decisions
//! - hyper parses; the ingress pipeline never sees raw bytes
//! - Body frames are forwarded as they arrive, never buffered here

pub mod response;
pub mod server;

pub use server::{IngressServer, TransportError};
