/*
 * session.rs
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

//! Per-connection handshake state machine.
//!
//! The session is driven by the connection with one event at a time:
//! `connected`, `on_message` (per inbound response or frame), `failed`,
//! and finally `disconnected`. Whatever happens first on the wire, the
//! [`Registration`] is resolved exactly once.

use crate::config::ClientConfig;
use crate::error::{Result, WebSocketError};
use crate::websocket::frame::Frame;
use crate::websocket::handler::{FrameConsumer, Outbound};
use crate::websocket::handshake::{body_text, target_uri, Handshaker, HttpResponse};
use crate::websocket::registration::Registration;

/// Lifecycle of a handshake session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Established,
    Failed,
    Closed,
}

/// One inbound unit of data.
#[derive(Debug)]
pub enum Inbound {
    /// A full HTTP response; only meaningful while pending.
    Response(HttpResponse),
    /// A WebSocket frame; only meaningful once established.
    Frame(Frame),
}

pub struct HandshakeSession {
    client_id: String,
    target: String,
    state: SessionState,
    handshaker: Option<Handshaker>,
    registration: Registration,
    consumer: Box<dyn FrameConsumer>,
}

impl HandshakeSession {
    /// Build the session for `config`. Fails only if the target is not a valid URI.
    pub fn new(
        config: &ClientConfig,
        consumer: Box<dyn FrameConsumer>,
        registration: Registration,
    ) -> Result<Self> {
        let (target, url) =
            target_uri(&config.host, config.port, &config.context_path, config.secure)?;
        Ok(HandshakeSession {
            client_id: config.client_id.clone(),
            handshaker: Some(Handshaker::new(url, &config.client_id)),
            target,
            state: SessionState::Pending,
            registration,
            consumer,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// The handshake target URI.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn registration(&self) -> &Registration {
        &self.registration
    }

    /// The underlying connection is open: send the upgrade request.
    pub fn connected(&mut self, out: &mut dyn Outbound) {
        if self.state != SessionState::Pending {
            return;
        }
        if let Some(handshaker) = self.handshaker.as_mut() {
            tracing::trace!(
                client_id = %self.client_id,
                target = %self.target,
                "web socket client sending handshake"
            );
            handshaker.begin(out);
        }
    }

    /// Dispatch one inbound response or frame.
    pub fn on_message(&mut self, message: Inbound, out: &mut dyn Outbound) {
        match (self.state, message) {
            (SessionState::Pending, Inbound::Response(response)) => self.on_response(response, out),
            (SessionState::Established, Inbound::Frame(frame)) => self.on_frame(frame, out),
            (state, Inbound::Response(response)) => {
                tracing::trace!(?state, status = response.status, "ignoring http response");
            }
            (state, Inbound::Frame(frame)) => {
                tracing::trace!(?state, kind = frame.kind(), "ignoring web socket frame");
            }
        }
    }

    fn on_response(&mut self, response: HttpResponse, out: &mut dyn Outbound) {
        let Some(handshaker) = self.handshaker.as_mut() else {
            return;
        };
        if response.has_token("upgrade", "websocket") && !handshaker.is_complete() {
            if let Err(e) = handshaker.finish(&response) {
                self.failed(e, out);
                return;
            }
            self.handshaker = None;
            self.state = SessionState::Established;
            self.registration.resolve_success(self.client_id.clone());
            tracing::trace!("web socket client {} connected", self.client_id);
        } else if response.status == 501 {
            let message = body_text(&response);
            self.handshaker = None;
            self.state = SessionState::Failed;
            self.registration
                .resolve_failure(WebSocketError::HandshakeRejected(message.clone()));
            tracing::warn!("{}", message);
        } else {
            let error = WebSocketError::UnsupportedResponse {
                status: response.status,
                reason: response.reason.clone(),
                headers: response.headers.clone(),
                body: body_text(&response),
            };
            self.handshaker = None;
            self.state = SessionState::Failed;
            tracing::warn!(client_id = %self.client_id, "{}", error);
            self.registration.resolve_failure(error);
        }
    }

    fn on_frame(&mut self, frame: Frame, out: &mut dyn Outbound) {
        match frame {
            Frame::Text(text) => self.consumer.text_frame(&text),
            Frame::Ping(payload) => out.write_frame(&Frame::Pong(payload)),
            Frame::Close { code, reason } => {
                tracing::trace!(?code, %reason, "web socket client received request to close");
                out.close();
                self.state = SessionState::Closed;
            }
            other => tracing::trace!(kind = other.kind(), "ignoring web socket frame"),
        }
    }

    /// Send a text frame to the server. Only allowed once established.
    pub fn send_text(&mut self, text: &str, out: &mut dyn Outbound) -> Result<()> {
        if self.state != SessionState::Established {
            return Err(WebSocketError::NotEstablished);
        }
        out.write_frame(&Frame::Text(text.to_string()));
        Ok(())
    }

    /// Locally requested close. A pending registration fails with `ConnectionClosed`.
    pub fn close(&mut self, out: &mut dyn Outbound) {
        if self.state == SessionState::Established {
            out.write_frame(&Frame::Close { code: Some(1000), reason: String::new() });
        }
        self.handshaker = None;
        self.registration.resolve_failure(WebSocketError::ConnectionClosed);
        out.close();
    }

    /// Transport or protocol failure: report, fail the registration if still open, close.
    pub fn failed(&mut self, error: WebSocketError, out: &mut dyn Outbound) {
        tracing::error!(
            client_id = %self.client_id,
            error = %error,
            kind = error.error_kind(),
            "web socket client caught exception"
        );
        if !self.registration.is_resolved() {
            self.registration.resolve_failure(error);
        }
        self.handshaker = None;
        if self.state == SessionState::Pending {
            self.state = SessionState::Failed;
        }
        out.close();
    }

    /// The connection has ended. Never touches the registration.
    pub fn disconnected(&mut self) {
        tracing::trace!(client_id = %self.client_id, "web socket client disconnected");
        self.handshaker = None;
        self.state = SessionState::Closed;
    }
}

/// A session dropped without a decision (task aborted or panicked) still
/// settles its registration.
impl Drop for HandshakeSession {
    fn drop(&mut self) {
        if self.registration.resolve_failure(WebSocketError::ConnectionClosed) {
            tracing::debug!(client_id = %self.client_id, "session dropped before registration");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::handshake::compute_expected_accept;
    use bytes::Bytes;
    use std::sync::{Arc, Mutex};
    use tracing::field::{Field, Visit};
    use tracing::{Level, Subscriber};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    #[derive(Default)]
    struct RecordingOutbound {
        raw: Vec<u8>,
        frames: Vec<Frame>,
        closed: usize,
    }

    impl Outbound for RecordingOutbound {
        fn write_raw(&mut self, data: &[u8]) {
            self.raw.extend_from_slice(data);
        }
        fn write_frame(&mut self, frame: &Frame) {
            self.frames.push(frame.clone());
        }
        fn close(&mut self) {
            self.closed += 1;
        }
    }

    #[derive(Clone, Default)]
    struct RecordingConsumer(Arc<Mutex<Vec<String>>>);

    impl FrameConsumer for RecordingConsumer {
        fn text_frame(&mut self, text: &str) {
            self.0.lock().unwrap().push(text.to_string());
        }
    }

    #[derive(Clone, Default)]
    struct EventLog(Arc<Mutex<Vec<(Level, String)>>>);

    struct MessageVisitor<'a>(&'a mut String);

    impl Visit for MessageVisitor<'_> {
        fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
            if field.name() == "message" {
                *self.0 = format!("{:?}", value);
            }
        }
    }

    impl<S: Subscriber> Layer<S> for EventLog {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            let mut message = String::new();
            event.record(&mut MessageVisitor(&mut message));
            self.0.lock().unwrap().push((*event.metadata().level(), message));
        }
    }

    impl EventLog {
        fn contains(&self, level: Level, needle: &str) -> bool {
            self.0
                .lock()
                .unwrap()
                .iter()
                .any(|(l, m)| *l == level && m.contains(needle))
        }
    }

    fn with_events<T>(f: impl FnOnce() -> T) -> (T, EventLog) {
        let log = EventLog::default();
        let subscriber = tracing_subscriber::registry().with(log.clone());
        let out = tracing::subscriber::with_default(subscriber, f);
        (out, log)
    }

    fn session(client_id: &str) -> (HandshakeSession, RecordingConsumer) {
        let mut config = ClientConfig::new("localhost", 1080);
        config.client_id = client_id.to_string();
        let consumer = RecordingConsumer::default();
        let session = HandshakeSession::new(&config, Box::new(consumer.clone()), Registration::new()).unwrap();
        (session, consumer)
    }

    fn sent_key(out: &RecordingOutbound) -> String {
        let request = String::from_utf8(out.raw.clone()).unwrap();
        request
            .lines()
            .find_map(|l| l.strip_prefix("Sec-WebSocket-Key: "))
            .unwrap()
            .to_string()
    }

    fn upgrade_response(key: &str) -> HttpResponse {
        HttpResponse {
            status: 101,
            reason: "Switching Protocols".into(),
            headers: vec![
                ("Upgrade".into(), "websocket".into()),
                ("Connection".into(), "Upgrade".into()),
                ("Sec-WebSocket-Accept".into(), compute_expected_accept(key)),
            ],
            body: Bytes::new(),
        }
    }

    fn established(client_id: &str) -> (HandshakeSession, RecordingConsumer, RecordingOutbound) {
        let (mut session, consumer) = session(client_id);
        let mut out = RecordingOutbound::default();
        session.connected(&mut out);
        let key = sent_key(&out);
        session.on_message(Inbound::Response(upgrade_response(&key)), &mut out);
        assert_eq!(session.state(), SessionState::Established);
        (session, consumer, out)
    }

    fn rejection(body: &[u8]) -> HttpResponse {
        HttpResponse {
            status: 501,
            reason: "Not Implemented".into(),
            headers: vec![("Content-Type".into(), "text/plain; charset=utf-8".into())],
            body: Bytes::copy_from_slice(body),
        }
    }

    #[test]
    fn construction_builds_target_and_rejects_bad_hosts() {
        let mut config = ClientConfig::new("localhost", 1080);
        config.context_path = "mock".into();
        config.secure = true;
        let session = HandshakeSession::new(&config, Box::new(RecordingConsumer::default()), Registration::new()).unwrap();
        assert_eq!(session.target(), "wss://localhost:1080/mock/_mockserver_callback_websocket");
        assert_eq!(session.state(), SessionState::Pending);

        let bad = ClientConfig::new("not a host", 1080);
        let err = HandshakeSession::new(&bad, Box::new(RecordingConsumer::default()), Registration::new())
            .err()
            .unwrap();
        assert_eq!(err.error_kind(), "construction");
    }

    #[test]
    fn connected_sends_upgrade_request() {
        let (mut session, _) = session("abc");
        let mut out = RecordingOutbound::default();
        session.connected(&mut out);
        let request = String::from_utf8(out.raw).unwrap();
        assert!(request.contains("X-CLIENT-REGISTRATION-ID: abc\r\n"));
        assert_eq!(session.state(), SessionState::Pending);
        assert!(!session.registration().is_resolved());
    }

    #[test]
    fn upgrade_response_establishes_and_resolves_with_client_id() {
        let ((session, _, out), events) = with_events(|| established("client-7"));
        assert_eq!(session.registration().result().unwrap().unwrap(), "client-7");
        assert_eq!(out.closed, 0);
        assert!(events.contains(Level::TRACE, "web socket client client-7 connected"));
    }

    #[test]
    fn failed_upgrade_verification_is_transport_error() {
        let (mut session, _) = session("id");
        let mut out = RecordingOutbound::default();
        session.connected(&mut out);
        session.on_message(Inbound::Response(upgrade_response("some-other-key")), &mut out);
        let err = session.registration().result().unwrap().unwrap_err();
        assert_eq!(err.error_kind(), "transport");
        assert_eq!(out.closed, 1);
        assert_ne!(session.state(), SessionState::Established);
    }

    #[test]
    fn not_implemented_fails_with_body_text() {
        let (mut session, _) = session("id");
        let mut out = RecordingOutbound::default();
        session.connected(&mut out);
        let (_, events) = with_events(|| {
            session.on_message(Inbound::Response(rejection(b"no matching expectation")), &mut out)
        });
        assert_eq!(session.state(), SessionState::Failed);
        let err = session.registration().result().unwrap().unwrap_err();
        assert!(matches!(err, WebSocketError::HandshakeRejected(_)));
        assert_eq!(err.to_string(), "no matching expectation");
        assert!(events.contains(Level::WARN, "no matching expectation"));
    }

    #[test]
    fn other_responses_are_unsupported() {
        let (mut session, _) = session("id");
        let mut out = RecordingOutbound::default();
        session.connected(&mut out);
        let response = HttpResponse {
            status: 302,
            reason: "Found".into(),
            headers: vec![("Location".into(), "/elsewhere".into())],
            body: Bytes::new(),
        };
        session.on_message(Inbound::Response(response), &mut out);
        assert_eq!(session.state(), SessionState::Failed);
        let err = session.registration().result().unwrap().unwrap_err();
        assert!(matches!(err, WebSocketError::UnsupportedResponse { status: 302, .. }));
        assert!(err.to_string().starts_with("Unsupported web socket message"));
    }

    #[test]
    fn late_responses_do_not_re_resolve() {
        let (mut session, _, mut out) = established("first");
        session.on_message(Inbound::Response(rejection(b"too late")), &mut out);
        assert_eq!(session.state(), SessionState::Established);
        assert_eq!(session.registration().result().unwrap().unwrap(), "first");

        let (mut failed, _) = self::session("second");
        let mut out = RecordingOutbound::default();
        failed.connected(&mut out);
        let key = sent_key(&out);
        failed.on_message(Inbound::Response(rejection(b"rejected")), &mut out);
        failed.on_message(Inbound::Response(upgrade_response(&key)), &mut out);
        assert_eq!(failed.state(), SessionState::Failed);
        assert_eq!(failed.registration().result().unwrap().unwrap_err().to_string(), "rejected");
    }

    #[test]
    fn text_frames_reach_consumer_unchanged() {
        let (mut session, consumer, mut out) = established("id");
        session.on_message(Inbound::Frame(Frame::Text("{\"a\":1}".into())), &mut out);
        session.on_message(Inbound::Frame(Frame::Text("second".into())), &mut out);
        assert_eq!(*consumer.0.lock().unwrap(), vec!["{\"a\":1}".to_string(), "second".to_string()]);
    }

    #[test]
    fn ping_gets_exactly_one_pong_with_same_payload() {
        let (mut session, _, mut out) = established("id");
        let payload = Bytes::from_static(b"heartbeat");
        session.on_message(Inbound::Frame(Frame::Ping(payload.clone())), &mut out);
        assert_eq!(out.frames, vec![Frame::Pong(payload)]);
        assert_eq!(session.state(), SessionState::Established);
    }

    #[test]
    fn close_frame_closes_and_stops_dispatch() {
        let (mut session, consumer, mut out) = established("id");
        let (_, events) = with_events(|| {
            session.on_message(Inbound::Frame(Frame::Close { code: Some(1000), reason: String::new() }), &mut out);
        });
        assert!(events.contains(Level::TRACE, "received request to close"));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(out.closed, 1);

        session.on_message(Inbound::Frame(Frame::Text("after close".into())), &mut out);
        session.on_message(Inbound::Frame(Frame::Ping(Bytes::from_static(b"p"))), &mut out);
        assert!(consumer.0.lock().unwrap().is_empty());
        assert!(out.frames.is_empty());
    }

    #[test]
    fn frames_before_establishment_are_ignored() {
        let (mut session, consumer) = session("id");
        let mut out = RecordingOutbound::default();
        session.connected(&mut out);
        session.on_message(Inbound::Frame(Frame::Text("early".into())), &mut out);
        session.on_message(Inbound::Frame(Frame::Ping(Bytes::from_static(b"p"))), &mut out);
        assert!(consumer.0.lock().unwrap().is_empty());
        assert!(out.frames.is_empty());
        assert_eq!(session.state(), SessionState::Pending);
    }

    #[test]
    fn other_frame_kinds_are_ignored() {
        let (mut session, consumer, mut out) = established("id");
        session.on_message(Inbound::Frame(Frame::Binary(Bytes::from_static(b"\x00"))), &mut out);
        session.on_message(Inbound::Frame(Frame::Pong(Bytes::new())), &mut out);
        assert!(consumer.0.lock().unwrap().is_empty());
        assert!(out.frames.is_empty());
        assert_eq!(session.state(), SessionState::Established);
    }

    #[test]
    fn transport_error_before_response_fails_registration_and_closes() {
        let (mut session, _) = session("id");
        let mut out = RecordingOutbound::default();
        session.connected(&mut out);
        let (_, events) = with_events(|| {
            session.failed(
                WebSocketError::transport(std::io::ErrorKind::ConnectionReset, "reset by peer"),
                &mut out,
            )
        });
        let err = session.registration().result().unwrap().unwrap_err();
        assert_eq!(err.error_kind(), "transport");
        assert!(err.to_string().contains("reset by peer"));
        assert_eq!(out.closed, 1);
        assert!(events.contains(Level::ERROR, "caught exception"));
    }

    #[test]
    fn transport_error_after_establishment_keeps_success() {
        let (mut session, _, mut out) = established("kept");
        session.failed(WebSocketError::transport(std::io::ErrorKind::BrokenPipe, "pipe"), &mut out);
        assert_eq!(session.registration().result().unwrap().unwrap(), "kept");
        assert_eq!(out.closed, 1);
        session.disconnected();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn disconnect_never_resolves() {
        let (mut session, _) = session("id");
        let (_, events) = with_events(|| session.disconnected());
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!session.registration().is_resolved());
        assert!(events.contains(Level::TRACE, "disconnected"));
    }

    #[test]
    fn send_text_requires_established() {
        let (mut pending, _) = session("id");
        let mut out = RecordingOutbound::default();
        assert!(matches!(pending.send_text("x", &mut out), Err(WebSocketError::NotEstablished)));

        let (mut session, _, mut out) = established("id");
        session.send_text("hello", &mut out).unwrap();
        assert_eq!(out.frames, vec![Frame::Text("hello".into())]);
    }

    #[test]
    fn local_close_fails_pending_registration() {
        let (mut session, _) = session("id");
        let mut out = RecordingOutbound::default();
        session.connected(&mut out);
        session.close(&mut out);
        assert!(matches!(
            session.registration().result().unwrap(),
            Err(WebSocketError::ConnectionClosed)
        ));
        assert_eq!(out.closed, 1);

        let (mut session, _, mut out) = established("id");
        session.close(&mut out);
        assert_eq!(session.registration().result().unwrap().unwrap(), "id");
        assert!(matches!(out.frames.last(), Some(Frame::Close { code: Some(1000), .. })));
    }

    #[test]
    fn dropping_an_undecided_session_fails_registration() {
        let (session, _) = session("id");
        let registration = session.registration().clone();
        let worker = std::thread::spawn(move || {
            let _session = session;
            panic!("connection task died");
        });
        assert!(worker.join().is_err());
        assert!(matches!(registration.result().unwrap(), Err(WebSocketError::ConnectionClosed)));

        let (session, _, _) = established("id");
        let registration = session.registration().clone();
        drop(session);
        assert_eq!(registration.result().unwrap().unwrap(), "id");
    }
}
