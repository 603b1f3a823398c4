/*
 * handler.rs
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

//! Callback seams between the session and the outside world.

use tokio::sync::mpsc;

use crate::websocket::frame::Frame;

/// Receives decoded text frames once the session is established.
/// Called synchronously from the read loop, so implementations must not block.
pub trait FrameConsumer: Send {
    fn text_frame(&mut self, text: &str);
}

impl FrameConsumer for mpsc::UnboundedSender<String> {
    fn text_frame(&mut self, text: &str) {
        if self.send(text.to_string()).is_err() {
            tracing::debug!("text frame dropped, receiver gone");
        }
    }
}

/// Write side of a connection as seen by the session. Writes are buffered;
/// the connection flushes them after each event.
pub trait Outbound {
    /// Raw bytes, used for the HTTP upgrade request.
    fn write_raw(&mut self, data: &[u8]);

    /// A frame, masked by the implementation.
    fn write_frame(&mut self, frame: &Frame);

    /// Ask for the connection to be closed once pending writes are flushed.
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_consumer_forwards_text() {
        let (mut tx, mut rx) = mpsc::unbounded_channel::<String>();
        tx.text_frame("{\"id\":1}");
        assert_eq!(rx.try_recv().unwrap(), "{\"id\":1}");
    }

    #[test]
    fn channel_consumer_survives_dropped_receiver() {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        drop(rx);
        let mut consumer: Box<dyn FrameConsumer> = Box::new(tx);
        consumer.text_frame("lost");
    }
}
