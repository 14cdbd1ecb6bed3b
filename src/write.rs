//! Outbound half of a connection. Grounded in the teacher's
//! `write_frame_server` (server frames are always unmasked), but simplified
//! to write pre-encoded bytes since framing itself now lives in
//! `signal::encode_frame` — this server role never needs the client-masking
//! branch the teacher's `Writer` also carries.

use crate::error::Error;
use crate::stream::Transport;
use tokio::io::{AsyncWriteExt, WriteHalf};

pub struct Writer {
    write_half: WriteHalf<Transport>,
}

impl Writer {
    pub fn new(write_half: WriteHalf<Transport>) -> Self {
        Self { write_half }
    }

    pub async fn write_raw(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.write_half
            .write_all(bytes)
            .await
            .map_err(|_| Error::ConnectionClosed)
    }

    pub async fn shutdown(&mut self) -> Result<(), Error> {
        self.write_half
            .shutdown()
            .await
            .map_err(|_| Error::ConnectionClosed)
    }
}
