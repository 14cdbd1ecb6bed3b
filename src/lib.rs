//! A real-time signaling server: WebSocket framing, a signal envelope
//! codec, and a peer/room registry with broadcast.
//!
//! Bytes enter through a sans-IO frame parser driven by a per-connection
//! task that upgrades the initial HTTP request, then replays parsed frames
//! against the peer lifecycle. [`server::ServerFacade`] owns the accept
//! loop, the peer/room registry, and the [`event::HookTable`] applications
//! subscribe to for authentication/connected/disconnected/signal events.

mod close;
mod connection;
mod frame;
mod handshake;
mod receiver;
mod registry;
mod stream;
mod write;

pub mod config;
pub mod error;
pub mod event;
pub mod peer;
pub mod server;
pub mod signal;

pub use config::ServerOptions;
pub use error::Error;
pub use peer::Peer;
pub use server::ServerFacade;
