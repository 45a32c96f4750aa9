//! Data-plane request pipeline
//!
//! Each client connection is handled in strict order:
//!
//! 1. read one request (abandon the connection if that fails)
//! 2. admission check, 429 on rejection; the registry is not consulted
//! 3. backend selection, 503 when none is registered
//! 4. single-shot round-trip to that backend, 502 on any failure
//! 5. relay the backend's response bytes unchanged
//!
//! Every stage reports through [`ForwardOutcome`] rather than unwinding, and
//! nothing that happens here can reach the accept loop.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::TcpStream;

use crate::admission::AdmissionController;
use crate::http::connection::{Connection, InboundRequest, ReadError};
use crate::http::request::Method;
use crate::http::response::Response;
use crate::http::writer::serialize_response;
use crate::proxy::backend::{Backend, BackendRegistry};
use crate::proxy::upstream::{BackendResponse, UpstreamClient, UpstreamError};

/// Result of running one request through admission, selection and the
/// backend round-trip.
#[derive(Debug)]
pub enum ForwardOutcome {
    /// Admission control said no.
    Rejected,
    /// The registry was empty.
    NoBackend,
    /// The selected backend could not complete the exchange.
    BackendFailed {
        backend: Backend,
        error: UpstreamError,
    },
    /// The backend answered; its response is relayed as-is.
    Relayed {
        backend: Backend,
        response: BackendResponse,
    },
}

impl ForwardOutcome {
    /// Status code the client will see.
    pub fn status(&self) -> u16 {
        match self {
            ForwardOutcome::Rejected => 429,
            ForwardOutcome::NoBackend => 503,
            ForwardOutcome::BackendFailed { .. } => 502,
            ForwardOutcome::Relayed { response, .. } => response.status,
        }
    }

    /// Bytes to write back to the client.
    pub fn into_bytes(self) -> Bytes {
        match self {
            ForwardOutcome::Rejected => serialize_response(&Response::too_many_requests()),
            ForwardOutcome::NoBackend => serialize_response(&Response::service_unavailable()),
            ForwardOutcome::BackendFailed { .. } => serialize_response(&Response::bad_gateway()),
            ForwardOutcome::Relayed { response, .. } => response.raw,
        }
    }
}

/// Handles data-plane connections against a shared admission controller and
/// backend registry.
pub struct RequestForwarder {
    admission: Arc<dyn AdmissionController>,
    registry: BackendRegistry,
    upstream: UpstreamClient,
}

impl RequestForwarder {
    pub fn new(
        admission: Arc<dyn AdmissionController>,
        registry: BackendRegistry,
        upstream: UpstreamClient,
    ) -> Self {
        Self {
            admission,
            registry,
            upstream,
        }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Runs the full pipeline on one accepted socket.
    pub async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let mut conn = Connection::new(stream);

        let inbound = match conn.read_request().await {
            Ok(inbound) => inbound,
            Err(ReadError::Closed) => {
                tracing::debug!(%peer, "Client closed connection before sending a request");
                return;
            }
            Err(e) => {
                tracing::warn!(
                    %peer,
                    error = %e,
                    "Error reading client request, dropping connection"
                );
                return;
            }
        };

        let outcome = self.dispatch(&inbound).await;
        let status = outcome.status();

        if let Err(e) = conn.write_raw(outcome.into_bytes()).await {
            tracing::warn!(%peer, status, error = %e, "Error returning response to client");
            return;
        }

        tracing::debug!(%peer, status, "Returned response to client");
    }

    /// Admission, selection and backend round-trip for an already-read
    /// request.
    pub async fn dispatch(&self, inbound: &InboundRequest) -> ForwardOutcome {
        let request = &inbound.request;

        if self.admission.is_overloaded() {
            tracing::debug!(
                strategy = self.admission.name(),
                method = request.method.as_str(),
                path = %request.path,
                "Too many requests, returning 429"
            );
            return ForwardOutcome::Rejected;
        }

        let Some(backend) = self.registry.select_backend().await else {
            tracing::warn!(
                method = request.method.as_str(),
                path = %request.path,
                "No backend registered, returning 503"
            );
            return ForwardOutcome::NoBackend;
        };

        tracing::debug!(
            backend = %backend.address(),
            method = request.method.as_str(),
            path = %request.path,
            "Forwarding request to backend"
        );

        let head_request = request.method == Method::HEAD;

        match self.upstream.round_trip(&backend, &inbound.raw, head_request).await {
            Ok(response) => {
                tracing::info!(
                    backend = %backend.address(),
                    status = response.status,
                    method = request.method.as_str(),
                    path = %request.path,
                    "Request forwarded successfully"
                );
                ForwardOutcome::Relayed { backend, response }
            }
            Err(error) => {
                tracing::warn!(
                    backend = %backend.address(),
                    error = %error,
                    method = request.method.as_str(),
                    path = %request.path,
                    "Error communicating with backend, returning 502"
                );
                ForwardOutcome::BackendFailed { backend, error }
            }
        }
    }
}
