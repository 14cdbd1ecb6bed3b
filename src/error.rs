use std::io;
use std::string::FromUtf8Error;
use thiserror::Error;

/// Every error kind the core can raise, tagged with the WebSocket close code
/// and (where spec §4.1/§7 assign one) the symbolic `WS_ERR_*` name it is
/// surfaced under in logs and close reasons.
#[derive(Error, Debug)]
pub enum Error {
    // --- Framing errors (FrameReceiver, C1) ---
    #[error("Invalid WebSocket frame: RSV2/RSV3 set")]
    UnexpectedRsv,

    #[error("Invalid WebSocket frame: invalid opcode")]
    InvalidOpcode,

    #[error("Invalid WebSocket frame: expected FIN on control frame")]
    ExpectedFin,

    #[error("Invalid WebSocket frame: invalid control payload length")]
    InvalidControlPayloadLength,

    #[error("Invalid WebSocket frame: expected masked frame from client")]
    ExpectedMask,

    #[error("Invalid WebSocket frame: unsupported payload length")]
    UnsupportedPayloadLength,

    #[error("max_payload exceeded")]
    MaxPayloadExceeded,

    // --- Application-envelope errors (C1/C2) ---
    #[error("Invalid signal data")]
    InvalidSignalData,

    #[error("signal code out of range (0..=9999)")]
    InvalidSignalCode,

    // --- Lifecycle errors (C3/C4) ---
    #[error("Authorization error.")]
    AuthorizationFailed,

    #[error("Server is Full.")]
    ServerFull,

    #[error("Kicked by {0}. (Reason: {1})")]
    Kicked(String, String),

    #[error("You have been banned by the {0} for {1}. (Reason: {2})")]
    Banned(String, String, String),

    #[error("Server exception (Message: {0}).")]
    ServerException(String),

    #[error("Connection closed by client (Message: {0}).")]
    ClientClosed(String),

    // --- Send errors ---
    #[error("connection closed")]
    ConnectionClosed,

    // --- Handshake errors (C5) ---
    #[error("HTTP method must be GET")]
    InvalidHttpMethod,

    #[error("Upgrade: websocket header missing or invalid")]
    NoUpgradeHeaderPresent,

    #[error("Sec-WebSocket-Version must be 8 or 13")]
    InvalidVersionHeader,

    #[error("Sec-WebSocket-Key missing or malformed")]
    InvalidSecWebsocketKey,

    #[error("{source}")]
    HttpParseError {
        #[from]
        source: httparse::Error,
    },

    #[error("incomplete HTTP request")]
    IncompleteHttpRequest,

    #[error("server is not accepting connections")]
    ServerNotRunning,

    // --- Transport / generic ---
    #[error("{source}")]
    IOError {
        #[from]
        source: io::Error,
    },

    #[error("{source}")]
    FromUtf8Error {
        #[from]
        source: FromUtf8Error,
    },

    #[error("{source}")]
    JsonError {
        #[from]
        source: serde_json::Error,
    },

    #[error("channel communication error")]
    CommunicationError,
}

impl Error {
    /// The WebSocket close code this error maps to, per spec §7.
    pub fn ws_code(&self) -> u16 {
        match self {
            Error::UnexpectedRsv => 1002,
            Error::InvalidOpcode => 1002,
            Error::ExpectedFin => 1002,
            Error::InvalidControlPayloadLength => 1002,
            Error::ExpectedMask => 1002,
            Error::UnsupportedPayloadLength => 1009,
            Error::MaxPayloadExceeded => 1009,
            Error::InvalidSignalData => 5105,
            Error::InvalidSignalCode => 5105,
            Error::AuthorizationFailed => 5101,
            Error::ServerFull => 5102,
            Error::Kicked(_, _) => 5103,
            Error::Banned(_, _, _) => 5104,
            Error::ServerException(_) => 5105,
            Error::ClientClosed(_) => 5201,
            _ => 1000,
        }
    }

    /// The symbolic tag spec §4.1/§7 names for framing/envelope errors, if any.
    pub fn tag(&self) -> Option<&'static str> {
        match self {
            Error::UnexpectedRsv => Some("WS_ERR_UNEXPECTED_RSV_2_3"),
            Error::InvalidOpcode => Some("WS_ERR_INVALID_OPCODE"),
            Error::ExpectedFin => Some("WS_ERR_EXPECTED_FIN"),
            Error::InvalidControlPayloadLength => Some("WS_ERR_INVALID_CONTROL_PAYLOAD_LENGTH"),
            Error::ExpectedMask => Some("WS_ERR_EXPECTED_MASK"),
            Error::UnsupportedPayloadLength => Some("WS_ERR_UNSUPPORTED_DATA_PAYLOAD_LENGTH"),
            Error::MaxPayloadExceeded => Some("WS_ERR_UNSUPPORTED_MESSAGE_LENGTH"),
            Error::InvalidSignalData => Some("WS_ERR_INVALID_SIGNAL_DATA"),
            _ => None,
        }
    }
}
