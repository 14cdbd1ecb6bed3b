//! The server facade (component C7): owns the accept loop, the shared
//! registry and hook table, and the public broadcast/room API. Grounded in
//! the teacher's `server.rs::start_server_with_config` accept-loop shape
//! (TLS branch, per-connection `tokio::spawn`), with the `EventStream`
//! replaced by the `HookTable` listener model per design note 9.

use crate::config::ServerOptions;
use crate::connection::ConnectionFsm;
use crate::error::Error;
use crate::event::{
    AuthHook, ConnectedHook, DisconnectedHook, HookHandle, HookTable, SignalHook,
};
use crate::handshake;
use crate::peer::Peer;
use crate::registry::PeerRegistry;
use crate::signal::SignalData;
use crate::stream::Transport;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio_rustls::TlsAcceptor;

pub struct ServerFacade {
    options: ServerOptions,
    registry: Arc<RwLock<PeerRegistry>>,
    hooks: Arc<HookTable>,
    running: AtomicBool,
}

impl ServerFacade {
    pub fn new(options: ServerOptions) -> Self {
        Self {
            options,
            registry: Arc::new(RwLock::new(PeerRegistry::new())),
            hooks: Arc::new(HookTable::new()),
            running: AtomicBool::new(true),
        }
    }

    /// Stops accepting new connections: subsequent handshakes get a 503 with
    /// `Error::ServerNotRunning`, per spec §4.5. Does not touch connections
    /// already established.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn on_authentication(&self, hook: AuthHook) -> HookHandle {
        self.hooks.on_authentication(hook).await
    }

    pub async fn on_connected(&self, hook: ConnectedHook) -> HookHandle {
        self.hooks.on_connected(hook).await
    }

    pub async fn on_disconnected(&self, hook: DisconnectedHook) -> HookHandle {
        self.hooks.on_disconnected(hook).await
    }

    pub async fn on_signal(&self, hook: SignalHook) -> HookHandle {
        self.hooks.on_signal(hook).await
    }

    pub async fn off(&self, handle: HookHandle) {
        self.hooks.off(handle).await
    }

    pub async fn clients(&self) -> Vec<Peer> {
        self.registry.read().await.clients_filtered(None, |_| true)
    }

    pub async fn client(&self, peer_id: &str) -> Option<Peer> {
        self.registry.read().await.get(peer_id)
    }

    pub async fn client_count(&self) -> usize {
        self.registry.read().await.count()
    }

    pub async fn join(&self, peer: &Peer, room: &str) {
        self.registry.write().await.join(room, peer.id());
    }

    pub async fn leave(&self, peer: &Peer, room: &str) -> bool {
        self.registry.write().await.leave(room, peer.id())
    }

    pub async fn leave_all(&self, peer: &Peer, mut on_room: impl FnMut(&str)) {
        self.registry.write().await.leave_all(peer.id(), &mut on_room);
    }

    /// Sends to every peer not in `except`. Reads a consistent snapshot under
    /// the registry lock, then performs the sends after releasing it, so a
    /// slow peer never blocks other lookups.
    pub async fn broadcast(&self, code: u16, data: impl Into<SignalData>, except: &[&str]) {
        let targets = self
            .registry
            .read()
            .await
            .clients_filtered(None, |peer| !except.contains(&peer.id()));
        self.send_to_all(code, data, targets).await;
    }

    pub async fn broadcast_in_room(
        &self,
        code: u16,
        data: impl Into<SignalData>,
        room: &str,
        except: &[&str],
    ) {
        let targets = self
            .registry
            .read()
            .await
            .clients_filtered(Some(room), |peer| !except.contains(&peer.id()));
        self.send_to_all(code, data, targets).await;
    }

    async fn send_to_all(&self, code: u16, data: impl Into<SignalData>, targets: Vec<Peer>) {
        let payload: Vec<u8> = match data.into() {
            SignalData::Bytes(bytes) => bytes,
            SignalData::Text(text) => text.into_bytes(),
            SignalData::Empty => Vec::new(),
            SignalData::Json(value) => {
                serde_json::to_vec(&value).unwrap_or_default()
            }
        };
        for peer in targets {
            if let Err(error) = peer.send(code, payload.clone()).await {
                warn!("broadcast send to {} failed: {error}", peer.id());
            }
        }
    }

    /// Runs the accept loop forever. Mirrors the teacher's TLS-aware accept
    /// branch, handing each socket off to the handshake gate and, on
    /// success, spawning a `ConnectionFsm` task.
    pub async fn run(self: Arc<Self>, tls_acceptor: Option<TlsAcceptor>) -> Result<(), Error> {
        let listener = TcpListener::bind((self.options.host.as_str(), self.options.port)).await?;
        info!(
            "signal-relay listening on {}:{}",
            self.options.host, self.options.port
        );

        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(error) => {
                    warn!("accept failed: {error}");
                    continue;
                }
            };

            let transport = if let Some(acceptor) = tls_acceptor.clone() {
                match acceptor.accept(stream).await {
                    Ok(tls_stream) => Transport::Secure(tls_stream),
                    Err(error) => {
                        warn!("TLS handshake with {addr} failed: {error}");
                        continue;
                    }
                }
            } else {
                Transport::Plain(stream)
            };

            let _ = transport.set_nodelay(true);

            let facade = Arc::clone(&self);
            tokio::spawn(async move {
                facade.handle_connection(transport, addr).await;
            });
        }
    }

    async fn handle_connection(&self, transport: Transport, addr: std::net::SocketAddr) {
        let (read_half, mut write_half) = tokio::io::split(transport);
        let mut buf_reader = BufReader::new(read_half);

        if !self.is_running() {
            debug!("rejecting {addr}: {}", Error::ServerNotRunning);
            let _ = handshake::write_response(&mut write_half, &handshake::failure_response(503)).await;
            return;
        }

        let request = match handshake::read_request(&mut buf_reader).await {
            Ok(request) => request,
            Err(error) => {
                debug!("handshake with {addr} rejected: {error}");
                let code = match error {
                    Error::InvalidHttpMethod
                    | Error::NoUpgradeHeaderPresent
                    | Error::InvalidVersionHeader
                    | Error::InvalidSecWebsocketKey
                    | Error::HttpParseError { .. }
                    | Error::IncompleteHttpRequest => 400,
                    _ => 503,
                };
                let _ = handshake::write_response(&mut write_half, &handshake::failure_response(code)).await;
                return;
            }
        };

        let peer_id = crate::peer::generate_peer_id();
        let response = handshake::success_response(
            &request.sec_websocket_key,
            request.sec_websocket_protocol.as_deref(),
            &peer_id,
        );
        if let Err(error) = handshake::write_response(&mut write_half, &response).await {
            warn!("failed writing handshake response to {addr}: {error}");
            return;
        }

        let writer = crate::write::Writer::new(write_half);
        let peer = Peer::new(peer_id, addr.ip().to_string(), addr.port(), writer, &self.options);

        let fsm = ConnectionFsm::new(
            peer,
            Arc::clone(&self.registry),
            Arc::clone(&self.hooks),
            buf_reader,
            self.options.max_payload,
            self.options.max_clients,
        );
        fsm.run().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write::Writer;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpSocket, TcpStream};

    /// A loopback-backed peer plus the client-side socket standing in for
    /// its remote end, so broadcasts can be observed landing on the wire.
    async fn peer_with_socket() -> (Peer, TcpStream) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = TcpSocket::new_v4().unwrap().connect(addr);
        let (accepted, connected) = tokio::join!(listener.accept(), connect);
        let (server_stream, _) = accepted.unwrap();
        let client_stream = connected.unwrap();
        let (_read, write_half) = tokio::io::split(Transport::Plain(server_stream));
        let peer = Peer::new(
            crate::peer::generate_peer_id(),
            "127.0.0.1".to_string(),
            0,
            Writer::new(write_half),
            &ServerOptions::default(),
        );
        (peer, client_stream)
    }

    #[tokio::test]
    async fn broadcast_excludes_listed_peer_ids() {
        let facade = ServerFacade::new(ServerOptions::default());
        let (peer_a, mut client_a) = peer_with_socket().await;
        let (peer_b, mut client_b) = peer_with_socket().await;
        facade.registry.write().await.insert(peer_a.clone());
        facade.registry.write().await.insert(peer_b.clone());

        facade
            .broadcast(5, b"hello".to_vec(), &[peer_a.id()])
            .await;

        let mut header = [0u8; 2];
        client_b.read_exact(&mut header).await.unwrap();
        let len = (header[1] & 0x7F) as usize;
        let mut payload = vec![0u8; len];
        client_b.read_exact(&mut payload).await.unwrap();
        assert_eq!(&payload[4..], b"hello");

        let mut buf = [0u8; 8];
        let timed_out = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            client_a.read(&mut buf),
        )
        .await;
        assert!(timed_out.is_err(), "excluded peer should receive nothing");
    }

    #[tokio::test]
    async fn client_count_and_join_leave_track_the_registry() {
        let facade = ServerFacade::new(ServerOptions::default());
        let (peer, _client) = peer_with_socket().await;
        facade.registry.write().await.insert(peer.clone());

        assert_eq!(facade.client_count().await, 1);
        facade.join(&peer, "lobby").await;
        assert!(facade.leave(&peer, "lobby").await);
        assert!(!facade.leave(&peer, "lobby").await);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_connections_with_503() {
        let facade = ServerFacade::new(ServerOptions::default());
        facade.shutdown();
        assert!(!facade.is_running());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = TcpSocket::new_v4().unwrap().connect(addr);
        let (accepted, connected) = tokio::join!(listener.accept(), connect);
        let (server_stream, peer_addr) = accepted.unwrap();
        let mut client_stream = connected.unwrap();

        facade
            .handle_connection(Transport::Plain(server_stream), peer_addr)
            .await;

        let mut buf = [0u8; 64];
        let n = client_stream.read(&mut buf).await.unwrap();
        let response = String::from_utf8_lossy(&buf[..n]);
        assert!(response.starts_with("HTTP/1.1 503"));
    }
}
