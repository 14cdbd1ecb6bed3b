//! Application hook table (component C7's listener side). Replaces the
//! teacher's `EventStream` (a `futures::Stream` over an `mpsc::Receiver`)
//! with the append-only listener-table-plus-handle shape design note 9
//! recommends: `on(event, listener) -> handle`, `off(event, handle)`, each
//! event subscribable zero-or-more times.

use crate::peer::Peer;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

pub type AuthHook = Arc<dyn Fn(Peer, Value) -> BoxFuture<bool> + Send + Sync>;
pub type ConnectedHook = Arc<dyn Fn(Peer) -> BoxFuture<()> + Send + Sync>;
pub type DisconnectedHook = Arc<dyn Fn(Peer, u16, String) -> BoxFuture<()> + Send + Sync>;
pub type SignalHook = Arc<dyn Fn(Peer, u16, Vec<u8>) -> BoxFuture<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Authentication,
    Connected,
    Disconnected,
    Signal,
}

/// Opaque handle returned by `on(...)`, valid for `off(...)`. Indices are
/// never reused within an event's table — a removed slot is tombstoned with
/// `None`, not swap-removed — so a stale handle is simply a no-op `off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookHandle {
    pub kind: EventKind,
    index: usize,
}

#[derive(Default)]
pub struct HookTable {
    authentication: RwLock<Vec<Option<AuthHook>>>,
    connected: RwLock<Vec<Option<ConnectedHook>>>,
    disconnected: RwLock<Vec<Option<DisconnectedHook>>>,
    signal: RwLock<Vec<Option<SignalHook>>>,
}

impl HookTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn on_authentication(&self, hook: AuthHook) -> HookHandle {
        let mut table = self.authentication.write().await;
        table.push(Some(hook));
        HookHandle {
            kind: EventKind::Authentication,
            index: table.len() - 1,
        }
    }

    pub async fn on_connected(&self, hook: ConnectedHook) -> HookHandle {
        let mut table = self.connected.write().await;
        table.push(Some(hook));
        HookHandle {
            kind: EventKind::Connected,
            index: table.len() - 1,
        }
    }

    pub async fn on_disconnected(&self, hook: DisconnectedHook) -> HookHandle {
        let mut table = self.disconnected.write().await;
        table.push(Some(hook));
        HookHandle {
            kind: EventKind::Disconnected,
            index: table.len() - 1,
        }
    }

    pub async fn on_signal(&self, hook: SignalHook) -> HookHandle {
        let mut table = self.signal.write().await;
        table.push(Some(hook));
        HookHandle {
            kind: EventKind::Signal,
            index: table.len() - 1,
        }
    }

    pub async fn off(&self, handle: HookHandle) {
        match handle.kind {
            EventKind::Authentication => {
                if let Some(slot) = self.authentication.write().await.get_mut(handle.index) {
                    *slot = None;
                }
            }
            EventKind::Connected => {
                if let Some(slot) = self.connected.write().await.get_mut(handle.index) {
                    *slot = None;
                }
            }
            EventKind::Disconnected => {
                if let Some(slot) = self.disconnected.write().await.get_mut(handle.index) {
                    *slot = None;
                }
            }
            EventKind::Signal => {
                if let Some(slot) = self.signal.write().await.get_mut(handle.index) {
                    *slot = None;
                }
            }
        }
    }

    /// AND-fold across every live subscriber; `true` (the vacuous case of no
    /// subscribers) authenticates everyone, matching spec §4.7.
    pub async fn dispatch_authentication(&self, peer: &Peer, credentials: Value) -> bool {
        let table = self.authentication.read().await;
        let captured_len = table.len();
        for hook in table.iter().take(captured_len).flatten() {
            if !hook(peer.clone(), credentials.clone()).await {
                return false;
            }
        }
        true
    }

    pub async fn dispatch_connected(&self, peer: &Peer) {
        let table = self.connected.read().await;
        let captured_len = table.len();
        for hook in table.iter().take(captured_len).flatten() {
            hook(peer.clone()).await;
        }
    }

    pub async fn dispatch_disconnected(&self, peer: &Peer, code: u16, reason: &str) {
        let table = self.disconnected.read().await;
        let captured_len = table.len();
        for hook in table.iter().take(captured_len).flatten() {
            hook(peer.clone(), code, reason.to_string()).await;
        }
    }

    pub async fn dispatch_signal(&self, peer: &Peer, code: u16, data: &[u8]) {
        let table = self.signal.read().await;
        let captured_len = table.len();
        for hook in table.iter().take(captured_len).flatten() {
            hook(peer.clone(), code, data.to_vec()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerOptions;
    use crate::write::Writer;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpSocket;

    async fn dummy_peer() -> Peer {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = TcpSocket::new_v4().unwrap().connect(addr);
        let (accepted, connected) = tokio::join!(listener.accept(), connect);
        let (stream, _) = accepted.unwrap();
        drop(connected.unwrap());
        let (_read, write_half) = tokio::io::split(crate::stream::Transport::Plain(stream));
        Peer::new(
            crate::peer::generate_peer_id(),
            "127.0.0.1".to_string(),
            1234,
            Writer::new(write_half),
            &ServerOptions::default(),
        )
    }

    #[tokio::test]
    async fn authentication_with_no_subscribers_passes_vacuously() {
        let table = HookTable::new();
        let peer = dummy_peer().await;
        assert!(table.dispatch_authentication(&peer, Value::Null).await);
    }

    #[tokio::test]
    async fn authentication_and_folds_across_subscribers() {
        let table = HookTable::new();
        table
            .on_authentication(Arc::new(|_peer, _creds| Box::pin(async { true })))
            .await;
        table
            .on_authentication(Arc::new(|_peer, _creds| Box::pin(async { false })))
            .await;
        let peer = dummy_peer().await;
        assert!(!table.dispatch_authentication(&peer, Value::Null).await);
    }

    #[tokio::test]
    async fn off_stops_a_hook_from_firing_again() {
        let table = HookTable::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handle = table
            .on_connected(Arc::new(move |_peer| {
                let counter = Arc::clone(&counter);
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            }))
            .await;
        let peer = dummy_peer().await;
        table.dispatch_connected(&peer).await;
        table.off(handle).await;
        table.dispatch_connected(&peer).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn off_on_a_stale_handle_is_a_no_op() {
        let table = HookTable::new();
        let handle = HookHandle {
            kind: EventKind::Disconnected,
            index: 0,
        };
        // Never subscribed — removing an out-of-range index must not panic.
        table.off(handle).await;
    }

    #[tokio::test]
    async fn dispatch_signal_reaches_every_subscriber() {
        let table = HookTable::new();
        let seen = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let seen = Arc::clone(&seen);
            table
                .on_signal(Arc::new(move |_peer, code, _data| {
                    let seen = Arc::clone(&seen);
                    Box::pin(async move {
                        seen.fetch_add(code as usize, Ordering::SeqCst);
                    })
                }))
                .await;
        }
        let peer = dummy_peer().await;
        table.dispatch_signal(&peer, 7, b"hi").await;
        assert_eq!(seen.load(Ordering::SeqCst), 21);
    }
}
