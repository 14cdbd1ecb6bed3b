//! Close-code catalogue (component C3): the canonical `(code, reason)` pairs
//! this server ever sends, plus the registry of short reason strings for
//! standard codes 1000-1015 used when a peer-supplied close carries no
//! reason text of its own.

/// `S5101` — application auth hook returned false.
pub fn authorization_error() -> (u16, String) {
    (5101, "Authorization error.".to_string())
}

/// `S5102` — `max_clients` reached.
pub fn server_full() -> (u16, String) {
    (5102, "Server is Full.".to_string())
}

/// `S5103` — an operator (or the server itself) kicked the peer.
pub fn kicked(user: Option<&str>, reason: Option<&str>) -> (u16, String) {
    (
        5103,
        format!(
            "Kicked by {}. (Reason: {})",
            user.unwrap_or("anonymous"),
            reason.unwrap_or("")
        ),
    )
}

/// `S5104` — an operator banned the peer for a length of time.
pub fn banned(user: Option<&str>, length: Option<&str>, reason: Option<&str>) -> (u16, String) {
    (
        5104,
        format!(
            "You have been banned by the {} for {}. (Reason: {})",
            user.unwrap_or("anonymous"),
            length.unwrap_or("? Days"),
            reason.unwrap_or("")
        ),
    )
}

/// `S5105` — an internal/protocol error forced the connection closed.
pub fn server_exception(msg: Option<&str>) -> (u16, String) {
    (5105, format!("Server exception (Message: {}).", msg.unwrap_or("")))
}

/// `C5201` — the client initiated the close handshake.
pub fn client_closed(msg: Option<&str>) -> (u16, String) {
    (
        5201,
        format!("Connection closed by client (Message: {}).", msg.unwrap_or("")),
    )
}

/// Canonical short reason strings for the standard 1000-1015 codes, used
/// when a close frame arrives with no reason text on the wire. Mirrors the
/// registry the original service calls `GetWSCodeReason`.
pub fn standard_code_reason(code: u16) -> &'static str {
    match code {
        1000 => "Normal Closure",
        1001 => "Going Away",
        1002 => "Protocol error",
        1003 => "Unsupported Data",
        1004 => "Reserved",
        1005 => "No Status Received",
        1006 => "Abnormal Closure",
        1007 => "Invalid frame payload data",
        1008 => "Policy Violation",
        1009 => "Message too big",
        1010 => "Mandatory Extension",
        1011 => "Internal Server Error",
        1012 => "Service Restart",
        1013 => "Try Again Later",
        1014 => "Bad Gateway",
        1015 => "TLS Handshake",
        _ => "",
    }
}

/// Resolves the reason string for a close code/raw-reason-bytes pair coming
/// off the wire: the bytes win if present, otherwise fall back to the
/// standard registry above. Mirrors `GetWSCodeReason` from spec §6.
pub fn resolve_code_reason(code: u16, reason_bytes: &[u8]) -> String {
    if !reason_bytes.is_empty() {
        String::from_utf8_lossy(reason_bytes).into_owned()
    } else {
        standard_code_reason(code).to_string()
    }
}
