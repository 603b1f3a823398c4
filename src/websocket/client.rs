/*
 * client.rs
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

//! WebSocket client: build the session, connect to ws:// or wss://, hand back
//! a `ClientHandle` whose registration resolves once the handshake is decided.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::error::{Result, WebSocketError};
use crate::websocket::connection::{Command, Connection, Outbox};
use crate::websocket::handler::FrameConsumer;
use crate::websocket::registration::Registration;
use crate::websocket::session::HandshakeSession;
use crate::websocket::stream::WsStream;

/// WebSocket client. Connect with `WebSocketClient::connect(config, consumer)`.
pub struct WebSocketClient;

impl WebSocketClient {
    /// Validate `config`, build the session and spawn the connection task.
    ///
    /// Only construction problems are returned here; everything after that
    /// (refused connection, TLS failure, rejected handshake) resolves the
    /// handle's registration with a failure.
    pub async fn connect(
        config: &ClientConfig,
        consumer: Box<dyn FrameConsumer>,
    ) -> Result<ClientHandle> {
        config.validate()?;
        let registration = Registration::new();
        let session = HandshakeSession::new(config, consumer, registration.clone())?;
        tracing::debug!(
            client_id = %config.client_id,
            target = %session.target(),
            "[ws] connecting"
        );

        let (commands, rx) = mpsc::unbounded_channel();
        let host = config.host.clone();
        let port = config.port;
        let secure = config.secure;
        let timeout = config.connect_timeout();
        let task = tokio::spawn(async move {
            match WsStream::connect(&host, port, secure, timeout).await {
                Ok(stream) => {
                    Connection::new(stream).run(session, rx).await;
                }
                Err(e) => {
                    let mut session = session;
                    session.failed(e.into(), &mut Outbox::default());
                    session.disconnected();
                }
            }
        });

        Ok(ClientHandle {
            client_id: config.client_id.clone(),
            registration,
            commands,
            task,
        })
    }
}

/// Handle on a running client connection.
pub struct ClientHandle {
    client_id: String,
    registration: Registration,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl ClientHandle {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// The completion sink; clones observe the same outcome.
    pub fn registration(&self) -> Registration {
        self.registration.clone()
    }

    /// Wait for the handshake outcome. Ok carries the registered client id.
    pub async fn registered(&self) -> Result<String> {
        self.registration.wait().await
    }

    /// Send a text frame. Fails with `NotEstablished` before the handshake completes.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::SendText(text.into(), reply))
            .map_err(|_| WebSocketError::ConnectionClosed)?;
        rx.await.map_err(|_| WebSocketError::ConnectionClosed)?
    }

    /// Ask the connection to close. No-op if it is already gone.
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }

    /// Wait for the connection task to end.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::warn!("[ws] connection task failed: {}", e);
        }
    }
}
