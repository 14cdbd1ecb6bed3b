/// The opcodes this core writes to the wire. Inbound frames are parsed
/// directly off their raw opcode nibble in `receiver.rs`; this enum only
/// exists for the outbound side (`signal::encode_frame`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Binary,
    Close,
}

impl OpCode {
    pub fn as_u8(&self) -> u8 {
        match self {
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
        }
    }
}
