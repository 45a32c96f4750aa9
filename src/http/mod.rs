//! HTTP/1.1 framing for both listening surfaces and for backend responses.
//!
//! - **`connection`**: reads one request off a socket and writes responses back
//! - **`parser`**: parses requests, response heads and chunked body framing
//! - **`request`**: HTTP request representation
//! - **`response`**: responses the gateway synthesizes itself (429/502/503, JSON)
//! - **`writer`**: frames synthesized responses and writes whole messages
//!
//! Every connection carries exactly one exchange:
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Buffer bytes until one request parses
//!        └──────┬──────┘
//!               │ Request received (parsed + raw bytes)
//!               ▼
//!        ┌──────────────────┐
//!        │    Handling      │ ← Data plane pipeline or control-plane handler
//!        └──────┬───────────┘
//!               │ Response ready
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← Send response, then close
//!        └──────────────────┘
//! ```

pub mod connection;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
