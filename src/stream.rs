//! Transport abstraction over a plain TCP socket or a TLS-wrapped one, so the
//! rest of the crate (handshake, receiver pump, writer) can stay generic over
//! "a duplex byte stream" as spec §6 frames it. Named and shaped after the
//! teacher's own `SocketFlowStream::Plain`/`Secure` split used throughout
//! `read.rs`/`write.rs`/`server.rs`.

use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;

pub enum Transport {
    Plain(TcpStream),
    Secure(TlsStream<TcpStream>),
}

impl Transport {
    pub fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        match self {
            Transport::Plain(stream) => stream.peer_addr(),
            Transport::Secure(stream) => stream.get_ref().0.peer_addr(),
        }
    }

    /// Disables Nagle's algorithm, per spec §4.4 ("configure transport:
    /// `no_delay = true`").
    pub fn set_nodelay(&self, nodelay: bool) -> std::io::Result<()> {
        match self {
            Transport::Plain(stream) => stream.set_nodelay(nodelay),
            Transport::Secure(stream) => stream.get_ref().0.set_nodelay(nodelay),
        }
    }
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Transport::Secure(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Transport::Secure(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Transport::Secure(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Transport::Secure(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}
