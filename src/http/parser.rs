use crate::http::request::{Method, Request};
use std::collections::HashMap;
use thiserror::Error;

/// Largest request (head and body) accepted from a client.
pub const MAX_REQUEST_SIZE: usize = 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid request line")]
    InvalidRequest,
    #[error("unsupported method")]
    InvalidMethod,
    #[error("invalid header line")]
    InvalidHeader,
    #[error("invalid Content-Length")]
    InvalidContentLength,
    #[error("chunked request bodies are not supported")]
    UnsupportedTransferEncoding,
    #[error("invalid status line")]
    InvalidStatusLine,
    #[error("invalid chunk framing")]
    InvalidChunk,
    #[error("request exceeds {max} bytes", max = MAX_REQUEST_SIZE)]
    TooLarge,
    #[error("incomplete message")]
    Incomplete,
}

/// Parses one request from the front of `buf`.
///
/// Returns the request and the number of bytes it occupies, so the caller can
/// forward exactly `buf[..consumed]` to a backend.
pub fn parse_http_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    let headers_end = match find_headers_end(buf) {
        Some(pos) => pos,
        None if buf.len() > MAX_REQUEST_SIZE => return Err(ParseError::TooLarge),
        None => return Err(ParseError::Incomplete),
    };
    let header_bytes = &buf[..headers_end];
    let body_bytes = &buf[headers_end + 4..];

    let headers_str = std::str::from_utf8(header_bytes).map_err(|_| ParseError::InvalidRequest)?;

    let mut lines = headers_str.split("\r\n");

    // Request line
    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = request_line.split_whitespace();

    let method_str = parts.next().ok_or(ParseError::InvalidRequest)?;
    let path = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next().ok_or(ParseError::InvalidRequest)?;

    if parts.next().is_some() || !version.starts_with("HTTP/") {
        return Err(ParseError::InvalidRequest);
    }

    let method = Method::parse(method_str).ok_or(ParseError::InvalidMethod)?;

    let headers = parse_header_lines(lines)?;

    if header_value(&headers, "Transfer-Encoding")
        .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"))
    {
        return Err(ParseError::UnsupportedTransferEncoding);
    }

    // Body
    let content_length = header_value(&headers, "Content-Length")
        .map(|v| v.parse::<usize>().map_err(|_| ParseError::InvalidContentLength))
        .transpose()?
        .unwrap_or(0);

    if (headers_end + 4).saturating_add(content_length) > MAX_REQUEST_SIZE {
        return Err(ParseError::TooLarge);
    }

    if body_bytes.len() < content_length {
        return Err(ParseError::Incomplete);
    }

    let body = body_bytes[..content_length].to_vec();

    let request = Request {
        method,
        path: path.to_string(),
        version: version.to_string(),
        headers,
        body,
    };

    let total_consumed = headers_end + 4 + content_length;
    Ok((request, total_consumed))
}

/// Status line and headers of a backend response.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: HashMap<String, String>,
}

/// How the body following a response head is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    None,
    Length(usize),
    Chunked,
    UntilClose,
}

impl ResponseHead {
    pub fn header(&self, key: &str) -> Option<&str> {
        header_value(&self.headers, key)
    }

    /// Works out where the body ends. `head_request` is true when the response
    /// answers a HEAD request, which never carries a body.
    pub fn body_framing(&self, head_request: bool) -> Result<BodyFraming, ParseError> {
        if head_request
            || (100..200).contains(&self.status)
            || self.status == 204
            || self.status == 304
        {
            return Ok(BodyFraming::None);
        }

        if self
            .header("Transfer-Encoding")
            .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"))
        {
            return Ok(BodyFraming::Chunked);
        }

        match self.header("Content-Length") {
            Some(v) => v
                .parse::<usize>()
                .map(BodyFraming::Length)
                .map_err(|_| ParseError::InvalidContentLength),
            None => Ok(BodyFraming::UntilClose),
        }
    }
}

/// Parses a response head. `buf` must end with the blank line.
pub fn parse_response_head(buf: &[u8]) -> Result<ResponseHead, ParseError> {
    let head = std::str::from_utf8(buf).map_err(|_| ParseError::InvalidStatusLine)?;
    let mut lines = head.split("\r\n");

    let status_line = lines.next().ok_or(ParseError::InvalidStatusLine)?;
    let mut parts = status_line.splitn(3, ' ');

    let version = parts.next().ok_or(ParseError::InvalidStatusLine)?;
    if !version.starts_with("HTTP/") {
        return Err(ParseError::InvalidStatusLine);
    }

    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .filter(|code| (100..1000).contains(code))
        .ok_or(ParseError::InvalidStatusLine)?;

    let headers = parse_header_lines(lines)?;

    Ok(ResponseHead { status, headers })
}

/// Scans a chunked body at the front of `buf`.
///
/// Returns `Some(len)` once the terminating chunk and trailer section are
/// present, where `len` is the number of bytes the encoded body occupies.
pub fn chunked_body_len(buf: &[u8]) -> Result<Option<usize>, ParseError> {
    let mut pos = 0;

    loop {
        let Some(line_end) = find_crlf(&buf[pos..]).map(|i| pos + i) else {
            return Ok(None);
        };

        let line =
            std::str::from_utf8(&buf[pos..line_end]).map_err(|_| ParseError::InvalidChunk)?;
        let size_str = line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_str, 16).map_err(|_| ParseError::InvalidChunk)?;
        pos = line_end + 2;

        if size == 0 {
            // Trailer section, terminated by an empty line
            loop {
                let Some(trailer_end) = find_crlf(&buf[pos..]).map(|i| pos + i) else {
                    return Ok(None);
                };
                if trailer_end == pos {
                    return Ok(Some(pos + 2));
                }
                pos = trailer_end + 2;
            }
        }

        let data_end = pos.checked_add(size).ok_or(ParseError::InvalidChunk)?;
        if buf.len() < data_end.saturating_add(2) {
            return Ok(None);
        }
        if &buf[data_end..data_end + 2] != b"\r\n" {
            return Err(ParseError::InvalidChunk);
        }
        pos = data_end + 2;
    }
}

pub fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Headers that decide where a body ends. Repeats must agree.
const FRAMING_HEADERS: [&str; 2] = ["Content-Length", "Transfer-Encoding"];

/// Collects header lines, folding names that differ only in case into the
/// first spelling seen. Repeated ordinary headers are joined with `, `; a
/// repeated framing header with a different value is rejected.
fn parse_header_lines<'a>(
    lines: impl Iterator<Item = &'a str>,
) -> Result<HashMap<String, String>, ParseError> {
    let mut headers: HashMap<String, String> = HashMap::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }

        let (key, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
        let (key, value) = (key.trim(), value.trim());

        let existing = headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v);

        match existing {
            None => {
                headers.insert(key.to_string(), value.to_string());
            }
            Some(current) if FRAMING_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(key)) => {
                if current.as_str() != value {
                    return Err(ParseError::InvalidContentLength);
                }
            }
            Some(current) => {
                current.push_str(", ");
                current.push_str(value);
            }
        }
    }

    Ok(headers)
}

fn header_value<'a>(headers: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}
