use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::http::parser::{parse_http_request, ParseError};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::writer::{serialize_response, write_message};

const READ_CHUNK: usize = 4096;

/// A parsed client request together with the exact bytes it arrived as.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub request: Request,
    pub raw: Bytes,
}

/// Why no request could be read from a connection.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("malformed request: {0}")]
    Malformed(#[from] ParseError),
    #[error("peer closed the connection before sending a complete request")]
    Closed,
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One accepted socket, read as HTTP/1.1 requests and written as responses.
pub struct Connection {
    stream: TcpStream,
    buffer: BytesMut,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    pub async fn read_request(&mut self) -> Result<InboundRequest, ReadError> {
        loop {
            // Try parsing whatever we already have
            match parse_http_request(&self.buffer) {
                Ok((request, consumed)) => {
                    let raw = self.buffer.split_to(consumed).freeze();
                    return Ok(InboundRequest { request, raw });
                }

                Err(ParseError::Incomplete) => {}

                Err(e) => return Err(ReadError::Malformed(e)),
            }

            self.buffer.reserve(READ_CHUNK);
            let n = self.stream.read_buf(&mut self.buffer).await?;

            if n == 0 {
                return Err(ReadError::Closed);
            }
        }
    }

    pub async fn write_response(&mut self, response: &Response) -> std::io::Result<()> {
        write_message(&mut self.stream, &serialize_response(response)).await
    }

    /// Writes an already framed message verbatim.
    pub async fn write_raw(&mut self, bytes: Bytes) -> std::io::Result<()> {
        write_message(&mut self.stream, &bytes).await
    }
}
