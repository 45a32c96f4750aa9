#![allow(dead_code)]

use std::net::SocketAddr;

use bytes::Bytes;
use gatekeeper::admission::AdmissionController;
use gatekeeper::http::connection::InboundRequest;
use gatekeeper::http::parser::parse_http_request;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

pub struct AlwaysReject;

impl AdmissionController for AlwaysReject {
    fn is_overloaded(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "always_reject"
    }
}

pub struct AlwaysAdmit;

impl AdmissionController for AlwaysAdmit {
    fn is_overloaded(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "always_admit"
    }
}

/// How a fake backend behaves after writing its canned response.
#[derive(Clone, Copy)]
pub enum AfterResponse {
    /// Close the socket immediately.
    Close,
    /// Keep the socket open until the proxy closes its side.
    HoldOpen,
}

/// Starts a backend that answers every connection with `response` and reports
/// the request bytes it received.
pub async fn spawn_backend(
    response: &'static [u8],
    after: AfterResponse,
) -> (SocketAddr, mpsc::UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let received = read_one_request(&mut stream).await;
                let _ = tx.send(received);
                let _ = stream.write_all(response).await;
                if let AfterResponse::HoldOpen = after {
                    let mut sink = [0u8; 256];
                    while matches!(stream.read(&mut sink).await, Ok(n) if n > 0) {}
                }
            });
        }
    });

    (addr, rx)
}

/// Starts a backend that accepts connections and never answers.
pub async fn spawn_silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut sink = [0u8; 256];
                while matches!(stream.read(&mut sink).await, Ok(n) if n > 0) {}
            });
        }
    });

    addr
}

/// A local port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn read_one_request(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    loop {
        if let Ok((_, consumed)) = parse_http_request(&buf) {
            buf.truncate(consumed);
            return buf;
        }
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return buf,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

/// Parses `raw` the way the data plane does after reading it off a socket.
pub fn inbound(raw: &'static [u8]) -> InboundRequest {
    let (request, consumed) = parse_http_request(raw).unwrap();
    assert_eq!(consumed, raw.len());
    InboundRequest {
        request,
        raw: Bytes::from_static(raw),
    }
}

/// Sends raw bytes and reads until the server closes the connection.
pub async fn send_raw(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    response
}

/// Status code from the first line of a raw response.
pub fn status_of(response: &[u8]) -> u16 {
    let text = String::from_utf8_lossy(response);
    text.split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap_or(0)
}

/// Everything after the blank line of a raw response.
pub fn body_of(response: &[u8]) -> &[u8] {
    let pos = response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response has no header terminator");
    &response[pos + 4..]
}
