//! Peer data model (spec §3) — the application-visible handle to one
//! connection. A `Peer` is a cheap `Arc` handle: the connection task that
//! drives the socket and the `PeerRegistry` both hold clones of the same
//! handle, so sends/broadcasts reach the live connection without routing
//! through a channel.

use crate::config::ServerOptions;
use crate::error::Error;
use crate::frame::OpCode;
use crate::signal::{encode_frame, encode_signal, SignalData};
use crate::write::Writer;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerLifecycle {
    Pending,
    Connected,
    Disconnected,
}

struct PeerInner {
    id: String,
    remote_addr: String,
    remote_port: u16,
    info: RwLock<Map<String, Value>>,
    settings: RwLock<Map<String, Value>>,
    lifecycle: RwLock<PeerLifecycle>,
    verified: AtomicBool,
    max_payload: u64,
    writer: Mutex<Writer>,
}

/// `"MK" + 12 uppercase hex chars` derived from a UUIDv4 suffix, per §3.
pub fn generate_peer_id() -> String {
    let uuid = uuid::Uuid::new_v4();
    let hex = uuid.simple().to_string().to_uppercase();
    format!("MK{}", &hex[..12])
}

#[derive(Clone)]
pub struct Peer {
    inner: Arc<PeerInner>,
}

impl Peer {
    /// `id` is generated by the caller ahead of time so the handshake
    /// response's `Sec-WebSocket-ID` header can be written before the
    /// `Peer` (and its `Writer`) exist.
    pub fn new(id: String, remote_addr: String, remote_port: u16, writer: Writer, options: &ServerOptions) -> Self {
        let mut info = Map::new();
        info.insert("client_id".to_string(), Value::String(id.clone()));
        let mut settings = Map::new();
        settings.insert("online".to_string(), Value::Bool(false));

        Self {
            inner: Arc::new(PeerInner {
                id,
                remote_addr,
                remote_port,
                info: RwLock::new(info),
                settings: RwLock::new(settings),
                lifecycle: RwLock::new(PeerLifecycle::Pending),
                verified: AtomicBool::new(false),
                max_payload: options.max_payload,
                writer: Mutex::new(writer),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn remote_addr(&self) -> &str {
        &self.inner.remote_addr
    }

    pub fn remote_port(&self) -> u16 {
        self.inner.remote_port
    }

    pub fn is_verified(&self) -> bool {
        self.inner.verified.load(Ordering::SeqCst)
    }

    /// Monotonic false -> true transition, synchronous with processing the
    /// first code-0 signal. Returns `true` if this call performed the
    /// transition (i.e. the peer was not already verified).
    pub fn mark_verified(&self) -> bool {
        self.inner
            .verified
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub async fn state(&self) -> PeerLifecycle {
        *self.inner.lifecycle.read().await
    }

    /// Pending -> Connected or Pending/Connected -> Disconnected only; never
    /// backward. Returns `true` if this call performed the transition.
    pub async fn set_state(&self, next: PeerLifecycle) -> bool {
        let mut cur = self.inner.lifecycle.write().await;
        let allowed = matches!(
            (*cur, next),
            (PeerLifecycle::Pending, PeerLifecycle::Connected)
                | (PeerLifecycle::Pending, PeerLifecycle::Disconnected)
                | (PeerLifecycle::Connected, PeerLifecycle::Disconnected)
        );
        if allowed {
            *cur = next;
        }
        allowed
    }

    pub async fn info(&self) -> Map<String, Value> {
        self.inner.info.read().await.clone()
    }

    pub async fn set_info(&self, info: Map<String, Value>) {
        let mut guard = self.inner.info.write().await;
        *guard = info;
        guard
            .entry("client_id".to_string())
            .or_insert_with(|| Value::String(self.inner.id.clone()));
    }

    pub async fn settings(&self) -> Map<String, Value> {
        self.inner.settings.read().await.clone()
    }

    pub async fn set_settings(&self, settings: Map<String, Value>) {
        *self.inner.settings.write().await = settings;
    }

    /// Encodes and writes a binary signal frame. Reports (and refuses to
    /// send) if the encoded payload would be at or above `max_payload`.
    pub async fn send(&self, code: u16, data: impl Into<SignalData>) -> Result<(), Error> {
        let encoded = encode_signal(code, data.into())?;
        if self.inner.max_payload > 0 && encoded.len() as u64 >= self.inner.max_payload {
            return Err(Error::MaxPayloadExceeded);
        }
        let frame = encode_frame(true, OpCode::Binary, &encoded);
        self.inner.writer.lock().await.write_raw(&frame).await
    }

    /// Sends a close frame and shuts down the write half. `code == 1005`
    /// (no status) is sent with an empty payload; otherwise the payload is
    /// `big-endian u16(code) ++ "--" ++ reason`.
    pub async fn close(&self, code: u16, reason: &str) -> Result<(), Error> {
        let payload = if code == 1005 {
            Vec::new()
        } else {
            let mut p = code.to_be_bytes().to_vec();
            p.extend_from_slice(format!("--{reason}").as_bytes());
            p
        };
        let frame = encode_frame(true, OpCode::Close, &payload);
        let mut writer = self.inner.writer.lock().await;
        writer.write_raw(&frame).await?;
        writer.shutdown().await
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.inner.id)
            .field("remote_addr", &self.inner.remote_addr)
            .field("remote_port", &self.inner.remote_port)
            .finish()
    }
}
