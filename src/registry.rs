//! Client/room registry (component C6): an indexed set of active peers plus
//! per-room membership lists. Grounded in the teacher's `HashMap`-based
//! header storage idiom (`request.rs::HttpRequest.headers`) generalized to
//! two maps, since `socket-flow` — a point-to-point WS library — has no
//! registry or room concept of its own to draw on directly.

use crate::peer::Peer;
use std::collections::HashMap;

#[derive(Default)]
pub struct PeerRegistry {
    clients: HashMap<String, Peer>,
    rooms: HashMap<String, Vec<String>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if a peer with this id was already present.
    pub fn insert(&mut self, peer: Peer) -> bool {
        self.clients.insert(peer.id().to_string(), peer).is_none()
    }

    /// Removes the peer from `clients` and from every room it belonged to.
    pub fn remove(&mut self, peer_id: &str) -> bool {
        self.leave_all(peer_id, |_| {});
        self.clients.remove(peer_id).is_some()
    }

    pub fn get(&self, peer_id: &str) -> Option<Peer> {
        self.clients.get(peer_id).cloned()
    }

    pub fn count(&self) -> usize {
        self.clients.len()
    }

    /// Creates the room on first membership. Does not deduplicate: joining
    /// twice appends the id twice, matching the original's documented quirk
    /// (spec §4.6/§9) — `leave` below removes every occurrence at once, so
    /// the duplication is harmless to callers, only visible in raw counts.
    pub fn join(&mut self, room: &str, peer_id: &str) {
        self.rooms
            .entry(room.to_string())
            .or_default()
            .push(peer_id.to_string());
    }

    /// Returns `true` only if the peer was actually a member of `room`.
    pub fn leave(&mut self, room: &str, peer_id: &str) -> bool {
        match self.rooms.get_mut(room) {
            Some(members) => {
                let before = members.len();
                members.retain(|id| id != peer_id);
                let removed = members.len() != before;
                if members.is_empty() {
                    self.rooms.remove(room);
                }
                removed
            }
            None => false,
        }
    }

    /// Removes `peer_id` from every room, invoking `on_room(room)` for each
    /// room it was actually a member of.
    pub fn leave_all(&mut self, peer_id: &str, mut on_room: impl FnMut(&str)) {
        let rooms: Vec<String> = self.rooms.keys().cloned().collect();
        for room in rooms {
            if self.leave(&room, peer_id) {
                on_room(&room);
            }
        }
    }

    pub fn count_in_room(&self, room: &str) -> usize {
        self.rooms.get(room).map(Vec::len).unwrap_or(0)
    }

    /// Snapshot of peers, optionally scoped to a room and/or filtered by
    /// predicate. Returning an owned `Vec` (rather than an iterator borrowing
    /// the registry) is what lets broadcast read a consistent snapshot while
    /// the registry lock is released for the actual sends (spec §5).
    pub fn clients_filtered(
        &self,
        room: Option<&str>,
        mut predicate: impl FnMut(&Peer) -> bool,
    ) -> Vec<Peer> {
        match room {
            Some(room) => self
                .rooms
                .get(room)
                .into_iter()
                .flatten()
                .filter_map(|id| self.clients.get(id))
                .filter(|peer| predicate(peer))
                .cloned()
                .collect(),
            None => self
                .clients
                .values()
                .filter(|peer| predicate(peer))
                .cloned()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerOptions;
    use crate::stream::Transport;
    use crate::write::Writer;
    use tokio::net::TcpSocket;

    async fn dummy_peer() -> Peer {
        // A Writer needs a live WriteHalf; these tests only exercise
        // registry bookkeeping, never actually write to it, so we bind a
        // loopback pair purely to get a valid WriteHalf<Transport>.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = TcpSocket::new_v4().unwrap().connect(addr);
        let (accepted, connected) = tokio::join!(listener.accept(), connect);
        let (stream, _) = accepted.unwrap();
        drop(connected.unwrap());
        let (_read, write_half) = tokio::io::split(Transport::Plain(stream));
        Peer::new(
            crate::peer::generate_peer_id(),
            "127.0.0.1".to_string(),
            1234,
            Writer::new(write_half),
            &ServerOptions::default(),
        )
    }

    #[tokio::test]
    async fn join_does_not_deduplicate() {
        let peer = dummy_peer().await;
        let mut registry = PeerRegistry::new();
        registry.insert(peer.clone());
        registry.join("lobby", peer.id());
        registry.join("lobby", peer.id());
        assert_eq!(registry.count_in_room("lobby"), 2);
    }

    #[tokio::test]
    async fn leave_removes_all_occurrences_at_once() {
        let peer = dummy_peer().await;
        let mut registry = PeerRegistry::new();
        registry.insert(peer.clone());
        registry.join("lobby", peer.id());
        registry.join("lobby", peer.id());
        assert!(registry.leave("lobby", peer.id()));
        assert_eq!(registry.count_in_room("lobby"), 0);
        assert!(!registry.leave("lobby", peer.id()));
    }

    #[tokio::test]
    async fn leave_all_clears_every_room() {
        let peer = dummy_peer().await;
        let mut registry = PeerRegistry::new();
        registry.insert(peer.clone());
        registry.join("a", peer.id());
        registry.join("b", peer.id());
        let mut left = Vec::new();
        registry.leave_all(peer.id(), |room| left.push(room.to_string()));
        left.sort();
        assert_eq!(left, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(registry.count_in_room("a"), 0);
        assert_eq!(registry.count_in_room("b"), 0);
    }

    #[tokio::test]
    async fn count_tracks_distinct_connected_peers() {
        let peer_a = dummy_peer().await;
        let peer_b = dummy_peer().await;
        let mut registry = PeerRegistry::new();
        assert!(registry.insert(peer_a.clone()));
        assert!(registry.insert(peer_b.clone()));
        assert_eq!(registry.count(), 2);
        registry.remove(peer_a.id());
        assert_eq!(registry.count(), 1);
    }
}
