//! Control plane
//!
//! Backends register (and re-register as a heartbeat) by POSTing
//! `{"host": "...", "port": N}`. `GET /backends` lists what is currently
//! registered.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpStream;

use crate::http::connection::{Connection, ReadError};
use crate::http::request::{Method, Request};
use crate::http::response::{Response, StatusCode};
use crate::proxy::backend::BackendRegistry;

/// Why a registration payload was refused.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("request body must be a JSON object")]
    NotAnObject,
    #[error("{0}")]
    InvalidField(#[source] serde_json::Error),
    #[error("host must not be empty")]
    EmptyHost,
    #[error("port must be between 1 and 65535")]
    InvalidPort,
}

#[derive(Debug, Deserialize)]
struct Registration {
    host: String,
    port: u16,
}

#[derive(Debug, Serialize)]
struct BackendView {
    host: String,
    port: u16,
    age_ms: u64,
}

/// Parses a registration body into `(host, port)`.
pub fn parse_registration(body: &[u8]) -> Result<(String, u16), RegistrationError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(RegistrationError::InvalidJson)?;

    if !value.is_object() {
        return Err(RegistrationError::NotAnObject);
    }

    let Registration { host, port } =
        serde_json::from_value(value).map_err(RegistrationError::InvalidField)?;

    if host.trim().is_empty() {
        return Err(RegistrationError::EmptyHost);
    }
    if port == 0 {
        return Err(RegistrationError::InvalidPort);
    }

    Ok((host, port))
}

#[derive(Debug, Clone)]
pub struct ControlPlaneHandler {
    registry: BackendRegistry,
}

impl ControlPlaneHandler {
    pub fn new(registry: BackendRegistry) -> Self {
        Self { registry }
    }

    /// Routes one control-plane request.
    pub async fn handle(&self, request: &Request) -> Response {
        match (request.method, request.route()) {
            (Method::GET, "/backends") => self.list_backends().await,
            (Method::POST, _) => self.handle_register(request).await,
            (Method::GET, _) => error_response(StatusCode::NotFound, "not found"),
            _ => error_response(StatusCode::MethodNotAllowed, "method not allowed"),
        }
    }

    /// Registers the backend described by the request body.
    ///
    /// Nothing is registered unless the whole payload is valid.
    pub async fn handle_register(&self, request: &Request) -> Response {
        match parse_registration(&request.body) {
            Ok((host, port)) => {
                self.registry.register_backend(&host, port).await;
                Response::json(StatusCode::Ok, &json!({ "status": "ok" }))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Rejected backend registration");
                error_response(StatusCode::BadRequest, &e.to_string())
            }
        }
    }

    async fn list_backends(&self) -> Response {
        let backends: Vec<BackendView> = self
            .registry
            .snapshot()
            .await
            .into_iter()
            .map(|b| BackendView {
                age_ms: u64::try_from(b.age().as_millis()).unwrap_or(u64::MAX),
                host: b.host,
                port: b.port,
            })
            .collect();

        Response::json(StatusCode::Ok, &backends)
    }

    /// Reads one request from a control-plane socket and answers it.
    pub async fn serve_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let mut conn = Connection::new(stream);

        let request = match conn.read_request().await {
            Ok(inbound) => inbound.request,
            Err(ReadError::Closed) => {
                tracing::debug!(%peer, "Control client closed connection before sending a request");
                return;
            }
            Err(e) => {
                tracing::warn!(%peer, error = %e, "Error reading control request");
                return;
            }
        };

        let response = self.handle(&request).await;

        if let Err(e) = conn.write_response(&response).await {
            tracing::warn!(%peer, error = %e, "Error returning control response");
            return;
        }

        tracing::debug!(%peer, status = response.status.as_u16(), "Returned control response");
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    Response::json(status, &json!({ "error": message }))
}
