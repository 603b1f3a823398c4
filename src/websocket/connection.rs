/*
 * connection.rs
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

//! WebSocket connection: owns the stream, feeds one session with a serialized
//! sequence of events, flushes whatever the session wrote after each one.

use bytes::{Buf, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

use crate::error::{Result, WebSocketError};
use crate::websocket::frame::{Frame, FrameParser};
use crate::websocket::handler::Outbound;
use crate::websocket::handshake::parse_response;
use crate::websocket::session::{HandshakeSession, Inbound, SessionState};

/// Requests from a [`ClientHandle`](crate::websocket::ClientHandle) to its connection task.
#[derive(Debug)]
pub enum Command {
    SendText(String, oneshot::Sender<Result<()>>),
    Close,
}

/// Buffered writes produced by the session while handling one event.
#[derive(Debug, Default)]
pub struct Outbox {
    buf: BytesMut,
    close_requested: bool,
}

impl Outbound for Outbox {
    fn write_raw(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    fn write_frame(&mut self, frame: &Frame) {
        let mut mask_key = [0u8; 4];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut mask_key);
        frame.encode_masked(mask_key, &mut self.buf);
    }

    fn close(&mut self) {
        self.close_requested = true;
    }
}

/// One connection driving one session. Use `run()` to drive it to completion.
pub struct Connection<S> {
    stream: S,
    read_buf: BytesMut,
    frame_parser: FrameParser,
    outbox: Outbox,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(8192),
            frame_parser: FrameParser::new(),
            outbox: Outbox::default(),
        }
    }

    /// Run the session until the connection ends. Returns the session, now Closed.
    pub async fn run(
        mut self,
        mut session: HandshakeSession,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) -> HandshakeSession {
        session.connected(&mut self.outbox);
        let mut commands_open = true;
        loop {
            if let Err(e) = self.flush().await {
                session.failed(e.into(), &mut self.outbox);
            }
            if self.outbox.close_requested || session.state() == SessionState::Failed {
                break;
            }
            tokio::select! {
                read = self.stream.read_buf(&mut self.read_buf) => match read {
                    Ok(0) => {
                        tracing::debug!("[ws] stream EOF");
                        self.on_eof(&mut session);
                        break;
                    }
                    Ok(n) => {
                        tracing::trace!("[ws] read {} bytes (buf now {})", n, self.read_buf.len());
                        if let Err(e) = self.dispatch(&mut session, false) {
                            session.failed(e, &mut self.outbox);
                        }
                    }
                    Err(e) => session.failed(e.into(), &mut self.outbox),
                },
                command = commands.recv(), if commands_open => match command {
                    Some(Command::SendText(text, reply)) => {
                        let _ = reply.send(session.send_text(&text, &mut self.outbox));
                    }
                    Some(Command::Close) => session.close(&mut self.outbox),
                    None => commands_open = false,
                },
            }
        }
        if let Err(e) = self.flush().await {
            tracing::debug!("[ws] final flush failed: {}", e);
        }
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!("[ws] shutdown failed: {}", e);
        }
        tracing::debug!(frames = self.frame_parser.frames_parsed(), "[ws] connection ended");
        session.disconnected();
        session
    }

    /// Feed every complete response or frame in the read buffer to the session.
    fn dispatch(&mut self, session: &mut HandshakeSession, eof: bool) -> Result<()> {
        while !self.outbox.close_requested {
            let message = match session.state() {
                SessionState::Pending => match parse_response(&self.read_buf, eof) {
                    None => return Ok(()),
                    Some(Err(e)) => return Err(e.into()),
                    Some(Ok((response, consumed))) => {
                        self.read_buf.advance(consumed);
                        Inbound::Response(response)
                    }
                },
                SessionState::Established => {
                    match self.frame_parser.next_frame(&mut self.read_buf)? {
                        None => return Ok(()),
                        Some(frame) => Inbound::Frame(frame),
                    }
                }
                SessionState::Failed | SessionState::Closed => return Ok(()),
            };
            session.on_message(message, &mut self.outbox);
        }
        Ok(())
    }

    /// Peer closed. Before the handshake response this is a failure, afterwards a normal close.
    fn on_eof(&mut self, session: &mut HandshakeSession) {
        if session.state() == SessionState::Pending {
            if let Err(e) = self.dispatch(session, true) {
                session.failed(e, &mut self.outbox);
                return;
            }
        }
        if session.state() == SessionState::Pending {
            session.failed(
                WebSocketError::transport(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed before handshake response",
                ),
                &mut self.outbox,
            );
        }
    }

    async fn flush(&mut self) -> io::Result<()> {
        if self.outbox.buf.is_empty() {
            return Ok(());
        }
        let pending = self.outbox.buf.split();
        self.stream.write_all(&pending).await?;
        self.stream.flush().await
    }
}
