//! Upstream connection and request forwarding
//!
//! This module handles one round-trip to a backend: resolve its address,
//! connect, write the client's request bytes unchanged, and read back one
//! complete response without re-encoding it.

use crate::http::parser::{
    chunked_body_len, find_headers_end, parse_response_head, BodyFraming, ParseError,
};
use crate::proxy::backend::Backend;
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Default buffer size for reading responses
const BUFFER_SIZE: usize = 8192;

/// Largest response head accepted from a backend
const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Every way a backend round-trip can fail. All of them surface to the client
/// as 502 Bad Gateway.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("failed to resolve {addr}: {source}")]
    Resolve {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} resolved to no addresses")]
    NoAddress(String),
    #[error("failed to connect: {0}")]
    Connect(#[source] std::io::Error),
    #[error("connection timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("failed to send request: {0}")]
    Write(#[source] std::io::Error),
    #[error("failed to read response: {0}")]
    Read(#[source] std::io::Error),
    #[error("backend closed the connection before a complete response")]
    ClosedEarly,
    #[error("response head exceeds {max} bytes", max = MAX_HEAD_SIZE)]
    HeadTooLarge,
    #[error("malformed response: {0}")]
    Malformed(#[from] ParseError),
    #[error("no complete response within {0:?}")]
    Timeout(Duration),
}

/// A complete backend response, kept as the bytes it arrived as.
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub status: u16,
    pub raw: Bytes,
}

/// Opens one fresh connection per forwarded request.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    /// Connection timeout duration
    connect_timeout: Duration,

    /// Request timeout duration
    request_timeout: Duration,
}

impl UpstreamClient {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            request_timeout,
        }
    }

    /// Sends `raw_request` to `backend` and reads back one full response.
    ///
    /// `head_request` marks a HEAD exchange, whose response has no body
    /// regardless of its headers. No retry is attempted.
    pub async fn round_trip(
        &self,
        backend: &Backend,
        raw_request: &[u8],
        head_request: bool,
    ) -> Result<BackendResponse, UpstreamError> {
        let mut stream = self.connect(backend).await?;

        tracing::trace!(backend = %backend.address(), "Connected to backend");

        timeout(
            self.request_timeout,
            exchange(&mut stream, raw_request, head_request),
        )
        .await
        .map_err(|_| UpstreamError::Timeout(self.request_timeout))?
    }

    /// Resolves and connects, both within `connect_timeout`.
    async fn connect(&self, backend: &Backend) -> Result<TcpStream, UpstreamError> {
        timeout(self.connect_timeout, resolve_and_connect(backend))
            .await
            .map_err(|_| UpstreamError::ConnectTimeout(self.connect_timeout))?
    }
}

async fn resolve_and_connect(backend: &Backend) -> Result<TcpStream, UpstreamError> {
    let addr = backend.address();

    let addrs: Vec<_> = tokio::net::lookup_host((backend.host.as_str(), backend.port))
        .await
        .map_err(|source| UpstreamError::Resolve {
            addr: addr.clone(),
            source,
        })?
        .collect();

    if addrs.is_empty() {
        return Err(UpstreamError::NoAddress(addr));
    }

    TcpStream::connect(&addrs[..])
        .await
        .map_err(UpstreamError::Connect)
}

async fn exchange(
    stream: &mut TcpStream,
    raw_request: &[u8],
    head_request: bool,
) -> Result<BackendResponse, UpstreamError> {
    stream.write_all(raw_request).await.map_err(UpstreamError::Write)?;
    stream.flush().await.map_err(UpstreamError::Write)?;

    tracing::trace!(bytes = raw_request.len(), "Request sent to backend");

    read_response(stream, head_request).await
}

/// Reads exactly one response: the head, then a body delimited as the head
/// dictates.
async fn read_response(
    stream: &mut TcpStream,
    head_request: bool,
) -> Result<BackendResponse, UpstreamError> {
    let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);

    let head_len = loop {
        if let Some(pos) = find_headers_end(&buffer) {
            break pos + 4;
        }
        if buffer.len() > MAX_HEAD_SIZE {
            return Err(UpstreamError::HeadTooLarge);
        }
        fill(stream, &mut buffer).await?;
    };

    let head = parse_response_head(&buffer[..head_len])?;

    match head.body_framing(head_request)? {
        BodyFraming::None => buffer.truncate(head_len),
        BodyFraming::Length(len) => {
            let total = head_len.saturating_add(len);
            while buffer.len() < total {
                fill(stream, &mut buffer).await?;
            }
            buffer.truncate(total);
        }
        BodyFraming::Chunked => loop {
            if let Some(body_len) = chunked_body_len(&buffer[head_len..])? {
                buffer.truncate(head_len + body_len);
                break;
            }
            fill(stream, &mut buffer).await?;
        },
        BodyFraming::UntilClose => loop {
            buffer.reserve(BUFFER_SIZE);
            let n = stream.read_buf(&mut buffer).await.map_err(UpstreamError::Read)?;
            if n == 0 {
                break;
            }
        },
    }

    Ok(BackendResponse {
        status: head.status,
        raw: buffer.freeze(),
    })
}

/// Reads more bytes, treating EOF as a truncated response.
async fn fill(stream: &mut TcpStream, buffer: &mut BytesMut) -> Result<(), UpstreamError> {
    buffer.reserve(BUFFER_SIZE);
    let n = stream.read_buf(buffer).await.map_err(UpstreamError::Read)?;

    if n == 0 {
        return Err(UpstreamError::ClosedEarly);
    }

    Ok(())
}
