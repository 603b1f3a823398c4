/*
 * handshake.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of callback-ws, a WebSocket callback client.
 *
 * callback-ws is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * callback-ws is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with callback-ws.  If not, see <http://www.gnu.org/licenses/>.
 */

//! WebSocket opening handshake (RFC 6455 §4, version 13): callback target URI,
//! GET with Upgrade and the registration header, full HTTP response parsing,
//! Sec-WebSocket-Accept verification.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::Bytes;
use std::borrow::Cow;
use std::io;
use url::Url;

use crate::error::{Result, WebSocketError};
use crate::websocket::handler::Outbound;

/// Magic string for Sec-WebSocket-Accept (RFC 6455 §4.2.2).
const WS_ACCEPT_MAGIC: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Path suffix of the callback endpoint, appended after the context path.
pub const CALLBACK_PATH: &str = "/_mockserver_callback_websocket";

/// Header carrying the client identifier on the upgrade request.
pub const CLIENT_REGISTRATION_ID_HEADER: &str = "X-CLIENT-REGISTRATION-ID";

/// Protocol version sent in Sec-WebSocket-Version.
pub const WEBSOCKET_VERSION: u8 = 13;

/// Longest status line plus headers accepted from the server.
pub const MAX_HEADER_LEN: usize = 8 * 1024;

/// Longest handshake response body accepted from the server.
pub const MAX_BODY_LEN: usize = 1024 * 1024;

/// Empty for a blank context path, otherwise exactly one leading `/`.
pub fn normalize_context_path(context_path: &str) -> Cow<'_, str> {
    if context_path.trim().is_empty() {
        Cow::Borrowed("")
    } else if context_path.starts_with('/') {
        Cow::Borrowed(context_path)
    } else {
        Cow::Owned(format!("/{}", context_path))
    }
}

/// Build `{ws|wss}://{host}:{port}{contextPath}/_mockserver_callback_websocket`.
pub fn target_uri(
    host: &str,
    port: u16,
    context_path: &str,
    secure: bool,
) -> Result<(String, Url)> {
    let scheme = if secure { "wss" } else { "ws" };
    let target = format!(
        "{}://{}:{}{}{}",
        scheme,
        host,
        port,
        normalize_context_path(context_path),
        CALLBACK_PATH
    );
    let url = Url::parse(&target)?;
    if url.host_str().map_or(true, str::is_empty) {
        return Err(WebSocketError::Construction(format!("no host in {}", target)));
    }
    Ok((target, url))
}

/// Build the HTTP GET request for the WebSocket handshake. Caller writes this to the stream.
pub fn build_handshake_request(
    url: &Url,
    key_base64: &str,
    extra_headers: &[(String, String)],
) -> Vec<u8> {
    let host = url.host_str().unwrap_or_default();
    let host_header = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    let mut path = url.path().to_string();
    if let Some(query) = url.query() {
        path.push('?');
        path.push_str(query);
    }
    let mut req = Vec::new();
    req.extend_from_slice(b"GET ");
    req.extend_from_slice(path.as_bytes());
    req.extend_from_slice(b" HTTP/1.1\r\nHost: ");
    req.extend_from_slice(host_header.as_bytes());
    req.extend_from_slice(b"\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: ");
    req.extend_from_slice(key_base64.as_bytes());
    let version = format!("\r\nSec-WebSocket-Version: {}\r\n", WEBSOCKET_VERSION);
    req.extend_from_slice(version.as_bytes());
    for (name, value) in extra_headers {
        req.extend_from_slice(name.as_bytes());
        req.extend_from_slice(b": ");
        req.extend_from_slice(value.as_bytes());
        req.extend_from_slice(b"\r\n");
    }
    req.extend_from_slice(b"\r\n");
    req
}

/// Compute expected Sec-WebSocket-Accept from the base64-encoded key we sent.
pub fn compute_expected_accept(key_base64: &str) -> String {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(key_base64.as_bytes());
    hasher.update(WS_ACCEPT_MAGIC);
    let digest = hasher.finalize();
    BASE64.encode(digest.as_slice())
}

/// Verify the server's Sec-WebSocket-Accept header matches our key.
pub fn verify_accept(accept_header: Option<&str>, key_base64: &str) -> io::Result<()> {
    let expected = compute_expected_accept(key_base64);
    match accept_header {
        Some(h) if h.trim() == expected => Ok(()),
        Some(_) => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "Sec-WebSocket-Accept mismatch",
        )),
        None => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "missing Sec-WebSocket-Accept",
        )),
    }
}

fn random_key() -> String {
    let mut key_raw = [0u8; 16];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut key_raw);
    BASE64.encode(key_raw)
}

// ============================================================
// HTTP response
// ============================================================

/// A complete HTTP response received while the handshake is pending.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpResponse {
    /// First value of the named header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// True if any value of the named header contains `token` in its comma-separated list.
    pub fn has_token(&self, name: &str, token: &str) -> bool {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .flat_map(|(_, v)| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    }
}

/// Decode the body using the charset of `Content-Type`, ISO-8859-1 when absent or unknown.
pub fn body_text(response: &HttpResponse) -> String {
    if response.body.is_empty() {
        return String::new();
    }
    let encoding = response
        .header("content-type")
        .and_then(charset_param)
        .and_then(|label| encoding_rs::Encoding::for_label(label.as_bytes()))
        .unwrap_or(encoding_rs::WINDOWS_1252);
    let (text, _had_errors) = encoding.decode_without_bom_handling(&response.body);
    text.into_owned()
}

fn charset_param(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"'))
        } else {
            None
        }
    })
}

fn invalid_response(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

/// Parse a complete HTTP response from the front of `buf`.
///
/// Returns None if more data is needed. On success also returns the number of
/// bytes consumed; anything after that is WebSocket frame data. `eof` marks that
/// the peer has closed, which terminates a body with no declared length.
/// Headers longer than `MAX_HEADER_LEN` or bodies longer than `MAX_BODY_LEN`
/// are an `InvalidData` error.
pub fn parse_response(buf: &[u8], eof: bool) -> Option<io::Result<(HttpResponse, usize)>> {
    let window = &buf[..buf.len().min(MAX_HEADER_LEN + 4)];
    let crlf2_pos = match find_header_end(window) {
        Some(pos) => pos,
        None if window.len() > MAX_HEADER_LEN + 3 => {
            return Some(Err(invalid_response("HTTP response headers too large")))
        }
        None if eof && !buf.is_empty() => {
            return Some(Err(invalid_response("connection closed inside HTTP response headers")))
        }
        None => return None,
    };
    let body_offset = crlf2_pos + 4;
    let header_str = match std::str::from_utf8(&buf[..crlf2_pos]) {
        Ok(s) => s,
        Err(_) => return Some(Err(invalid_response("invalid UTF-8 in HTTP response"))),
    };

    let mut lines = header_str.split("\r\n");
    let status_line = lines.next().unwrap_or_default();
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Some(Err(invalid_response("malformed HTTP status line")));
    }
    let status: u16 = match parts.next().and_then(|s| s.parse().ok()) {
        Some(s) => s,
        None => return Some(Err(invalid_response("malformed HTTP status code"))),
    };
    let reason = parts.next().unwrap_or_default().to_string();

    let mut headers = Vec::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }
    let mut response = HttpResponse { status, reason, headers, body: Bytes::new() };

    let rest = &buf[body_offset..];
    if status == 101 || status == 204 || status == 304 || (100..200).contains(&status) {
        return Some(Ok((response, body_offset)));
    }
    if response.has_token("transfer-encoding", "chunked") {
        return match decode_chunked(rest) {
            None if eof => Some(Err(invalid_response("connection closed inside chunked body"))),
            None => None,
            Some(Err(e)) => Some(Err(e)),
            Some(Ok((body, used))) => {
                response.body = Bytes::from(body);
                Some(Ok((response, body_offset + used)))
            }
        };
    }
    match response.header("content-length") {
        Some(len) => {
            let len: usize = match len.parse() {
                Ok(l) => l,
                Err(_) => return Some(Err(invalid_response("malformed Content-Length"))),
            };
            if len > MAX_BODY_LEN {
                return Some(Err(invalid_response("HTTP response body too large")));
            }
            if rest.len() < len {
                if eof {
                    return Some(Err(invalid_response("connection closed inside HTTP body")));
                }
                return None;
            }
            response.body = Bytes::copy_from_slice(&rest[..len]);
            Some(Ok((response, body_offset + len)))
        }
        None if rest.len() > MAX_BODY_LEN => {
            Some(Err(invalid_response("HTTP response body too large")))
        }
        None if eof => {
            response.body = Bytes::copy_from_slice(rest);
            Some(Ok((response, buf.len())))
        }
        None => None,
    }
}

/// Decode a chunked body. Returns the body and the bytes consumed, or None if incomplete.
fn decode_chunked(buf: &[u8]) -> Option<io::Result<(Vec<u8>, usize)>> {
    let mut body = Vec::new();
    let mut pos = 0;
    loop {
        let line_end = find_crlf(&buf[pos..])? + pos;
        let size_line = match std::str::from_utf8(&buf[pos..line_end]) {
            Ok(s) => s.split(';').next().unwrap_or_default().trim(),
            Err(_) => return Some(Err(invalid_response("invalid chunk size line"))),
        };
        let size = match usize::from_str_radix(size_line, 16) {
            Ok(s) => s,
            Err(_) => return Some(Err(invalid_response("invalid chunk size"))),
        };
        pos = line_end + 2;
        if size == 0 {
            // Skip trailers up to the blank line.
            loop {
                let end = find_crlf(&buf[pos..])? + pos;
                let blank = end == pos;
                pos = end + 2;
                if blank {
                    return Some(Ok((body, pos)));
                }
            }
        }
        if size > MAX_BODY_LEN - body.len() {
            return Some(Err(invalid_response("chunk size too large")));
        }
        let data_end = pos + size;
        if buf.len() < data_end + 2 {
            return None;
        }
        if &buf[data_end..data_end + 2] != b"\r\n" {
            return Some(Err(invalid_response("missing CRLF after chunk data")));
        }
        body.extend_from_slice(&buf[pos..data_end]);
        pos = data_end + 2;
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Find \r\n\r\n in buffer. Returns the offset of the first \r in \r\n\r\n.
fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

// ============================================================
// Negotiator
// ============================================================

/// Client side of the version 13 opening handshake, bound to one target.
#[derive(Debug)]
pub struct Handshaker {
    url: Url,
    key: String,
    headers: Vec<(String, String)>,
    complete: bool,
}

impl Handshaker {
    /// Handshaker for `url` that sends the registration header with `client_id`.
    pub fn new(url: Url, client_id: &str) -> Self {
        Handshaker {
            url,
            key: random_key(),
            headers: vec![(CLIENT_REGISTRATION_ID_HEADER.to_string(), client_id.to_string())],
            complete: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Write the upgrade request to the connection.
    pub fn begin(&mut self, out: &mut dyn Outbound) {
        out.write_raw(&build_handshake_request(&self.url, &self.key, &self.headers));
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Validate the server's upgrade response.
    pub fn finish(&mut self, response: &HttpResponse) -> Result<()> {
        if response.status != 101 {
            return Err(WebSocketError::transport(
                io::ErrorKind::InvalidData,
                format!(
                    "invalid handshake response status: {} {}",
                    response.status, response.reason
                ),
            ));
        }
        if !response.has_token("connection", "upgrade") {
            return Err(WebSocketError::transport(
                io::ErrorKind::InvalidData,
                "invalid handshake response connection header",
            ));
        }
        verify_accept(response.header("sec-websocket-accept"), &self.key)?;
        self.complete = true;
        Ok(())
    }
}
