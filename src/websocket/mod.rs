/*
 * mod.rs
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

//! WebSocket callback client (RFC 6455): registration handshake over HTTP/1.1,
//! then frame-based dispatch to a `FrameConsumer`.

mod client;
pub mod connection;
pub mod frame;
mod handler;
pub mod handshake;
mod registration;
pub mod session;
pub mod stream;

pub use client::{ClientHandle, WebSocketClient};
pub use frame::Frame;
pub use handler::{FrameConsumer, Outbound};
pub use registration::Registration;
pub use session::{HandshakeSession, Inbound, SessionState};
