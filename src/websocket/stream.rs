/*
 * stream.rs
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

//! Transport under the session: TCP, optionally wrapped in rustls.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::TlsConnector;

/// Cached TLS config (loaded once, reused for all connections).
static TLS_CONFIG: OnceLock<Arc<ClientConfig>> = OnceLock::new();

/// Plain or TLS connection to the callback endpoint.
pub enum WsStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl WsStream {
    /// Open TCP to host:port within `timeout`, then TLS when `secure`.
    pub async fn connect(
        host: &str,
        port: u16,
        secure: bool,
        timeout: Duration,
    ) -> io::Result<WsStream> {
        let addr = format!("{}:{}", host, port);
        let tcp = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| {
                io::Error::new(io::ErrorKind::TimedOut, format!("connect to {} timed out", addr))
            })??;
        tcp.set_nodelay(true)?;
        tracing::debug!(%addr, secure, "[ws] tcp connected");
        if secure {
            connect_tls(tcp, host).await
        } else {
            Ok(WsStream::Plain(tcp))
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, WsStream::Tls(_))
    }
}

impl AsyncRead for WsStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            WsStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            WsStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for WsStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            WsStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            WsStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            WsStream::Plain(s) => Pin::new(s).poll_flush(cx),
            WsStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            WsStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            WsStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Shared rustls config: ring provider, OS trust roots, no client auth.
pub fn tls_config() -> Arc<ClientConfig> {
    TLS_CONFIG
        .get_or_init(|| {
            let _ = tokio_rustls::rustls::crypto::ring::default_provider().install_default();
            let mut root_store = tokio_rustls::rustls::RootCertStore::empty();
            let cert_result = rustls_native_certs::load_native_certs();
            for e in &cert_result.errors {
                tracing::warn!("failed to load native root certs: {}", e);
            }
            for cert in cert_result.certs {
                if let Err(e) = root_store.add(cert) {
                    tracing::warn!("failed to add a native root cert: {}", e);
                }
            }
            tracing::debug!("loaded {} root certificates from system store", root_store.len());
            let config = ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth();
            Arc::new(config)
        })
        .clone()
}

/// TLS client handshake over `tcp`, verifying the certificate for `host`.
pub async fn connect_tls(tcp: TcpStream, host: &str) -> io::Result<WsStream> {
    let server_name = ServerName::try_from(host.to_string()).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("invalid TLS server name {:?}", host))
    })?;
    let connector = TlsConnector::from(tls_config());
    let tls = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::ConnectionRefused, e))?;
    Ok(WsStream::Tls(Box::new(tls)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn plain_stream_passes_bytes_through() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(&buf).await.unwrap();
        });

        let mut stream = WsStream::connect("127.0.0.1", addr.port(), false, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!stream.is_tls());
        stream.write_all(b"echo").await.unwrap();
        let mut back = [0u8; 4];
        stream.read_exact(&mut back).await.unwrap();
        assert_eq!(&back, b"echo");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn refused_connect_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(WsStream::connect("127.0.0.1", port, false, Duration::from_secs(5)).await.is_err());
    }

    #[tokio::test]
    async fn tls_rejects_invalid_server_name() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let tcp = TcpStream::connect(addr).await.unwrap();
        let err = connect_tls(tcp, "not a host name").await.err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
