//! Gatekeeper - rate-limited reverse proxy with self-registering backends
//!
//! Core library for admission control, backend selection and request forwarding.

pub mod admission;
pub mod config;
pub mod control;
pub mod http;
pub mod proxy;
pub mod server;
