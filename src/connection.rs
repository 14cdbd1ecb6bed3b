//! The connection FSM (component C4): owns one socket's read side, drives
//! `FrameReceiver` against it, and reacts to the outcomes against the peer's
//! lifecycle. Grounded in the teacher's `read.rs::poll_messages`/`server.rs`
//! task-spawn shape, but restructured around a synchronous sink that
//! collects outcomes for the async driver to replay in order, since the
//! receiver itself never awaits (spec §9's sans-IO design note).

use crate::close;
use crate::error::Error;
use crate::event::HookTable;
use crate::peer::{Peer, PeerLifecycle};
use crate::receiver::{FrameReceiver, ReceiverSink};
use crate::registry::PeerRegistry;
use bytes::{Bytes, BytesMut};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, BufReader, ReadHalf};
use tokio::sync::RwLock;
use tokio::time::sleep;

use crate::stream::Transport;

const VERIFY_TIMEOUT: Duration = Duration::from_secs(7);
const READ_BUF_SIZE: usize = 64 * 1024;

enum Outcome {
    Signal(u16, Vec<u8>),
    Conclude(u16, Vec<u8>),
    Error(Error),
}

#[derive(Default)]
struct OutcomeCollector {
    outcomes: Vec<Outcome>,
}

impl ReceiverSink for OutcomeCollector {
    fn on_signal(&mut self, code: u16, data: Vec<u8>) {
        self.outcomes.push(Outcome::Signal(code, data));
    }
    fn on_conclude(&mut self, code: u16, reason: Vec<u8>) {
        self.outcomes.push(Outcome::Conclude(code, reason));
    }
    fn on_error(&mut self, error: Error) {
        self.outcomes.push(Outcome::Error(error));
    }
}

pub struct ConnectionFsm {
    peer: Peer,
    registry: Arc<RwLock<PeerRegistry>>,
    hooks: Arc<HookTable>,
    read_half: BufReader<ReadHalf<Transport>>,
    receiver: FrameReceiver,
    max_clients: u32,
    registered: bool,
}

impl ConnectionFsm {
    /// `read_half` is the same `BufReader` the handshake read its request
    /// headers from — reusing it (rather than unwrapping to the raw
    /// `ReadHalf`) preserves any frame bytes the client pipelined right
    /// after the Upgrade request, which `BufReader::into_inner` would
    /// otherwise silently discard.
    pub fn new(
        peer: Peer,
        registry: Arc<RwLock<PeerRegistry>>,
        hooks: Arc<HookTable>,
        read_half: BufReader<ReadHalf<Transport>>,
        max_payload: u64,
        max_clients: u32,
    ) -> Self {
        Self {
            peer,
            registry,
            hooks,
            read_half,
            receiver: FrameReceiver::new(max_payload),
            max_clients,
            registered: false,
        }
    }

    /// Drives the connection until it closes, either by peer request, a
    /// protocol error, a socket error, or the verify deadline expiring.
    pub async fn run(mut self) {
        let verify_deadline = sleep(VERIFY_TIMEOUT);
        tokio::pin!(verify_deadline);

        let mut buf = BytesMut::with_capacity(READ_BUF_SIZE);
        loop {
            buf.clear();
            buf.resize(READ_BUF_SIZE, 0);
            tokio::select! {
                biased;
                _ = &mut verify_deadline, if !self.peer.is_verified() => {
                    self.closing(5103, close::kicked(Some("Server"), Some("Invalid client.")).1).await;
                    return;
                }
                read = self.read_half.read(&mut buf) => {
                    match read {
                        Ok(0) => {
                            self.closing(1000, String::new()).await;
                            return;
                        }
                        Ok(n) => {
                            self.receiver.push_bytes(Bytes::copy_from_slice(&buf[..n]));
                            if !self.drive().await {
                                return;
                            }
                        }
                        Err(e) => {
                            self.closing(5105, close::server_exception(Some(&e.to_string())).1).await;
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Runs the sans-IO parser over buffered bytes, then replays whatever it
    /// found, in order, against the peer/hooks. Returns `false` once the
    /// connection should stop (a conclude or a fatal error was processed).
    async fn drive(&mut self) -> bool {
        let mut collector = OutcomeCollector::default();
        self.receiver.run(&mut collector);

        for outcome in collector.outcomes {
            match outcome {
                Outcome::Signal(code, data) => {
                    if !self.handle_signal(code, data).await {
                        return false;
                    }
                }
                Outcome::Conclude(code, reason) => {
                    let reason = close::resolve_code_reason(code, &reason);
                    self.closing(code, reason).await;
                    return false;
                }
                Outcome::Error(error) => {
                    let code = error.ws_code();
                    self.closing(code, error.to_string()).await;
                    return false;
                }
            }
        }
        true
    }

    /// Returns `false` if this signal ended the connection (auth rejected).
    async fn handle_signal(&mut self, code: u16, data: Vec<u8>) -> bool {
        if !self.peer.is_verified() {
            // Only code 0 is the authentication message while unverified; any
            // other code is a protocol violation, per §4.4.
            if code != 0 {
                self.closing(5103, close::kicked(Some("Server"), Some("Invalid client.")).1)
                    .await;
                return false;
            }

            let credentials: Value = serde_json::from_slice(&data)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&data).into_owned()));
            let authorized = self.hooks.dispatch_authentication(&self.peer, credentials).await;
            if !authorized {
                let (close_code, reason) = close::authorization_error();
                self.closing(close_code, reason).await;
                return false;
            }
            if self.registry.read().await.count() as u32 >= self.max_clients {
                let (close_code, reason) = close::server_full();
                self.closing(close_code, reason).await;
                return false;
            }
            self.registry.write().await.insert(self.peer.clone());
            self.registered = true;

            self.peer.mark_verified();
            self.peer.set_state(PeerLifecycle::Connected).await;

            // Auth-success reply carries the literal shape the original
            // service sends back: the peer id followed by its stringified
            // `info` map, both inside one code-0 envelope (spec §8 scenario
            // 2) — not a JSON object keyed by id, just the concatenation.
            let info = self.peer.info().await;
            let reply = format!(
                "{}{}",
                self.peer.id(),
                serde_json::to_string(&info).unwrap_or_default()
            );
            if self.peer.send(0, reply).await.is_err() {
                self.closing(5105, close::server_exception(Some("write error during auth reply")).1)
                    .await;
                return false;
            }

            self.hooks.dispatch_connected(&self.peer).await;
            return true;
        }

        self.hooks.dispatch_signal(&self.peer, code, &data).await;
        true
    }

    /// The single exit path for this connection: marks it `Disconnected`,
    /// removes it from the registry (leaving every room it was in), fires
    /// `disconnected` exactly once, and best-effort writes a close frame.
    /// Mirrors spec §9's "merge the dual close paths into one dispatcher"
    /// decision.
    async fn closing(&mut self, code: u16, reason: String) {
        if !self.peer.set_state(PeerLifecycle::Disconnected).await {
            return;
        }
        let _ = self.peer.close(code, &reason).await;

        if self.registered {
            self.registry.write().await.remove(self.peer.id());
        }

        self.hooks.dispatch_disconnected(&self.peer, code, &reason).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerOptions;
    use crate::event::{DisconnectedHook, HookTable};
    use crate::signal::encode_signal;
    use crate::write::Writer;
    use std::sync::atomic::{AtomicU16, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpSocket, TcpStream};

    /// Wires a `ConnectionFsm` to one end of a loopback TCP pair and hands
    /// back the other end, so tests can write client frames in and read
    /// server frames/closes out exactly as a real peer would.
    async fn harness(
        hooks: Arc<HookTable>,
        max_clients: u32,
    ) -> (tokio::task::JoinHandle<()>, TcpStream) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = TcpSocket::new_v4().unwrap().connect(addr);
        let (accepted, connected) = tokio::join!(listener.accept(), connect);
        let (server_stream, _) = accepted.unwrap();
        let client_stream = connected.unwrap();

        let (read_half, write_half) = tokio::io::split(Transport::Plain(server_stream));
        let writer = Writer::new(write_half);
        let peer = Peer::new(
            crate::peer::generate_peer_id(),
            "127.0.0.1".to_string(),
            0,
            writer,
            &ServerOptions::default(),
        );
        let registry = Arc::new(RwLock::new(PeerRegistry::new()));
        let fsm = ConnectionFsm::new(
            peer,
            registry,
            hooks,
            BufReader::new(read_half),
            0,
            max_clients,
        );
        let handle = tokio::spawn(fsm.run());
        (handle, client_stream)
    }

    fn masked_binary_frame(payload: &[u8]) -> Vec<u8> {
        let mask = [0x11u8, 0x22, 0x33, 0x44];
        assert!(payload.len() <= 125);
        let mut frame = vec![0x82u8, 0x80 | payload.len() as u8];
        frame.extend_from_slice(&mask);
        for (i, b) in payload.iter().enumerate() {
            frame.push(b ^ mask[i % 4]);
        }
        frame
    }

    fn signal_frame(code: u16, data: &[u8]) -> Vec<u8> {
        let envelope = encode_signal(code, data.to_vec().into()).unwrap();
        masked_binary_frame(&envelope)
    }

    /// Reads one server->client frame and pulls out its close code, assuming
    /// a short (<=125 byte) unmasked frame as every response here is.
    async fn read_close_code(stream: &mut TcpStream) -> u16 {
        let mut header = [0u8; 2];
        stream.read_exact(&mut header).await.unwrap();
        let len = (header[1] & 0x7F) as usize;
        let mut payload = vec![0u8; len];
        if len > 0 {
            stream.read_exact(&mut payload).await.unwrap();
        }
        if len == 0 {
            return 1005;
        }
        u16::from_be_bytes([payload[0], payload[1]])
    }

    fn always_authorized() -> Arc<HookTable> {
        let table = Arc::new(HookTable::new());
        table
    }

    #[tokio::test]
    async fn nonzero_code_before_verification_closes_with_5103() {
        let hooks = always_authorized();
        let (handle, mut client) = harness(Arc::clone(&hooks), 10).await;

        client.write_all(&signal_frame(7, b"nope")).await.unwrap();
        let code = read_close_code(&mut client).await;
        assert_eq!(code, 5103);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn auth_rejected_closes_with_5101_and_never_registers() {
        let hooks = Arc::new(HookTable::new());
        hooks
            .on_authentication(Arc::new(|_peer, _creds| Box::pin(async { false })))
            .await;
        let (handle, mut client) = harness(Arc::clone(&hooks), 10).await;

        client.write_all(&signal_frame(0, b"creds")).await.unwrap();
        let code = read_close_code(&mut client).await;
        assert_eq!(code, 5101);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn max_clients_reached_at_auth_time_closes_with_5102() {
        let hooks = always_authorized();
        let (handle, mut client) = harness(Arc::clone(&hooks), 0).await;

        client.write_all(&signal_frame(0, b"creds")).await.unwrap();
        let code = read_close_code(&mut client).await;
        assert_eq!(code, 5102);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn auth_success_fires_connected_then_signal_passthrough_for_later_code_zero() {
        let hooks = Arc::new(HookTable::new());
        let connected_calls = Arc::new(AtomicU16::new(0));
        let connected_counter = Arc::clone(&connected_calls);
        hooks
            .on_connected(Arc::new(move |_peer| {
                let connected_counter = Arc::clone(&connected_counter);
                Box::pin(async move {
                    connected_counter.fetch_add(1, Ordering::SeqCst);
                })
            }))
            .await;
        let signal_codes = Arc::new(std::sync::Mutex::new(Vec::new()));
        let signal_sink = Arc::clone(&signal_codes);
        hooks
            .on_signal(Arc::new(move |_peer, code, _data| {
                let signal_sink = Arc::clone(&signal_sink);
                Box::pin(async move {
                    signal_sink.lock().unwrap().push(code);
                })
            }))
            .await;

        let (handle, mut client) = harness(Arc::clone(&hooks), 10).await;

        client.write_all(&signal_frame(0, b"creds")).await.unwrap();
        // Auth-success reply: peer id followed by its JSON info map.
        let mut header = [0u8; 2];
        client.read_exact(&mut header).await.unwrap();
        let len = (header[1] & 0x7F) as usize;
        let mut reply = vec![0u8; len];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(connected_calls.load(Ordering::SeqCst), 1);

        // A second code-0 signal after verification is ordinary passthrough,
        // not re-authentication.
        client.write_all(&signal_frame(0, b"ping")).await.unwrap();
        drop(client);
        handle.await.unwrap();
        assert_eq!(*signal_codes.lock().unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn eof_before_any_signal_closes_with_1000() {
        let hooks = Arc::new(HookTable::new());
        let disconnect_codes = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&disconnect_codes);
        let disconnected: DisconnectedHook = Arc::new(move |_peer, code, _reason| {
            let sink = Arc::clone(&sink);
            Box::pin(async move {
                sink.lock().unwrap().push(code);
            })
        });
        hooks.on_disconnected(disconnected).await;

        let (handle, client) = harness(Arc::clone(&hooks), 10).await;
        drop(client);
        handle.await.unwrap();
        assert_eq!(*disconnect_codes.lock().unwrap(), vec![1000]);
    }
}
