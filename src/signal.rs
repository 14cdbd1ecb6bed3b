//! The signal envelope codec (component C2) and the outbound frame writer
//! that wraps it, adapted from the teacher crate's `write.rs::write_frame_server`
//! (unmasked, server-to-client length encoding — masking is client-only).

use crate::error::Error;
use crate::frame::OpCode;
use serde_json::Value;

const MAGIC_BYTE_1: u8 = 25;
const MAGIC_BYTE_2: u8 = 151;

/// Anything that can become the payload bytes of a signal envelope.
pub enum SignalData {
    Bytes(Vec<u8>),
    Json(Value),
    Text(String),
    Empty,
}

impl From<Vec<u8>> for SignalData {
    fn from(bytes: Vec<u8>) -> Self {
        SignalData::Bytes(bytes)
    }
}

impl From<Value> for SignalData {
    fn from(value: Value) -> Self {
        SignalData::Json(value)
    }
}

impl From<String> for SignalData {
    fn from(text: String) -> Self {
        SignalData::Text(text)
    }
}

fn stringify(data: SignalData) -> Vec<u8> {
    match data {
        SignalData::Bytes(bytes) => bytes,
        SignalData::Empty => Vec::new(),
        SignalData::Text(text) => text.into_bytes(),
        SignalData::Json(Value::Null) => Vec::new(),
        SignalData::Json(Value::String(s)) => s.into_bytes(),
        SignalData::Json(value) => value.to_string().into_bytes(),
    }
}

/// Wraps `data` with the 4-byte signal header: `[code/100, code%100, 25, 151]`.
pub fn encode_signal(code: u16, data: SignalData) -> Result<Vec<u8>, Error> {
    if code > 9999 {
        return Err(Error::InvalidSignalCode);
    }
    let payload = stringify(data);
    let mut out = Vec::with_capacity(4 + payload.len());
    out.push((code / 100) as u8);
    out.push((code % 100) as u8);
    out.push(MAGIC_BYTE_1);
    out.push(MAGIC_BYTE_2);
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Splits a decoded envelope back into `(code, payload)`. The `FrameReceiver`
/// performs this decoding inline on the hot path; this standalone version
/// exists for tests and for any caller that already has an assembled buffer.
pub fn decode_signal(msg: &[u8]) -> Result<(u16, Vec<u8>), Error> {
    if msg.len() < 4 {
        return Err(Error::InvalidSignalData);
    }
    if msg[2] != MAGIC_BYTE_1 || msg[3] != MAGIC_BYTE_2 {
        return Err(Error::InvalidSignalData);
    }
    let code = 100u16 * msg[0] as u16 + msg[1] as u16;
    Ok((code, msg[4..].to_vec()))
}

/// Builds an outbound, unmasked wire frame: `opcode`/FIN byte, length
/// encoding (2/4/10 bytes depending on size), then the raw payload. Mirrors
/// §4.1's length-encoding rules in reverse, exactly as `write_frame_server`
/// does for the teacher's server role.
pub fn encode_frame(fin: bool, opcode: OpCode, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(10 + payload.len());
    let first_byte = ((fin as u8) << 7) | opcode.as_u8();
    out.push(first_byte);

    let len = payload.len();
    if len <= 125 {
        out.push(len as u8);
    } else if len <= 0xFFFF {
        out.push(126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }
    out.extend_from_slice(payload);
    out
}
