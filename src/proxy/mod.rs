//! Reverse proxy functionality
//!
//! Backend registry, upstream round-trips, and the per-connection forwarding
//! pipeline that ties them to admission control.

pub mod backend;
pub mod forwarder;
pub mod upstream;

pub use backend::{Backend, BackendRegistry};
pub use forwarder::{ForwardOutcome, RequestForwarder};
pub use upstream::{BackendResponse, UpstreamClient, UpstreamError};
