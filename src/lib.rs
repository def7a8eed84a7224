//! HTTP ingress library: assembles streamed requests into complete messages,
//! guards their size, and hands them to consumers over bounded lanes.

pub mod config;
pub mod handoff;
pub mod http;
pub mod ingress;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod upstream;

pub use config::schema::IngressConfig;
pub use handoff::{MessageProcessor, SummaryProcessor};
pub use ingress::{InboundMessage, OutboundResponse, Pipeline};
pub use lifecycle::{start, Ingress, Shutdown};
