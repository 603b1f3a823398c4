/*
 * error.rs
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

//! Error taxonomy for the callback client.
//!
//! Only [`WebSocketError::Construction`] is ever returned synchronously from
//! setup. Everything that happens on the wire ends up as the failure value of
//! the [`Registration`](crate::websocket::Registration) instead.

use std::io;
use std::sync::Arc;

/// Errors raised while registering with, or talking to, the callback endpoint.
///
/// `Clone` because a resolved registration hands the same failure to every waiter.
#[derive(Clone, Debug, thiserror::Error)]
pub enum WebSocketError {
    /// The target could not be expressed as a valid URI, or the config is unusable.
    #[error("invalid web socket target: {0}")]
    Construction(String),

    /// The endpoint answered the upgrade with 501; the message is the response body.
    #[error("{0}")]
    HandshakeRejected(String),

    /// Any other non-upgrade response while the handshake was pending.
    #[error("Unsupported web socket message {status} {reason} headers={headers:?} body={body:?}")]
    UnsupportedResponse {
        status: u16,
        reason: String,
        headers: Vec<(String, String)>,
        body: String,
    },

    /// Connection level failure: I/O, TLS, framing, or a handshake that did not verify.
    #[error("web socket transport error: {0}")]
    Transport(#[source] Arc<io::Error>),

    /// Outbound frame requested before the handshake completed (or after it failed).
    #[error("web socket session is not established")]
    NotEstablished,

    /// The connection task is gone.
    #[error("web socket connection closed")]
    ConnectionClosed,
}

impl WebSocketError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Construction(_) => "construction",
            Self::HandshakeRejected(_) => "handshake_rejected",
            Self::UnsupportedResponse { .. } => "unsupported_response",
            Self::Transport(_) => "transport",
            Self::NotEstablished => "not_established",
            Self::ConnectionClosed => "connection_closed",
        }
    }

    /// Wrap a transport failure described by `kind` and `msg`.
    pub fn transport(kind: io::ErrorKind, msg: impl Into<String>) -> Self {
        Self::Transport(Arc::new(io::Error::new(kind, msg.into())))
    }
}

impl From<io::Error> for WebSocketError {
    fn from(e: io::Error) -> Self {
        Self::Transport(Arc::new(e))
    }
}

impl From<url::ParseError> for WebSocketError {
    fn from(e: url::ParseError) -> Self {
        Self::Construction(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WebSocketError>;
