/*
 * lib.rs
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

//! Outbound WebSocket client for a mock server's callback endpoint.
//!
//! The client connects to `{ws|wss}://host:port{contextPath}/_mockserver_callback_websocket`,
//! identifies itself with a registration header, and reports through a
//! [`Registration`] whether the server accepted it. Once registered, text
//! frames are handed to a [`FrameConsumer`].

pub mod config;
pub mod debug;
pub mod error;
pub mod websocket;

pub use config::ClientConfig;
pub use error::{Result, WebSocketError};
pub use websocket::{ClientHandle, FrameConsumer, Registration, WebSocketClient};
