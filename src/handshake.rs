//! The HTTP Upgrade handshake (component C5). Grounded in the teacher's
//! `request.rs::HttpRequest::parse_http_request` for the timeout-guarded
//! header read, and `handshake.rs::generate_websocket_accept_value` for the
//! accept-key computation, but parses headers with `httparse` rather than
//! the teacher's hand-rolled line splitter, matching how the rest of the
//! retrieval pack handles HTTP/1.1 request lines.

use crate::error::Error;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout, Duration};

const ACCEPT_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
const MAX_HEADER_BYTES: usize = 16 * 1024;
const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HandshakeRequest {
    pub sec_websocket_key: String,
    pub sec_websocket_version: String,
    pub sec_websocket_protocol: Option<String>,
}

/// Reads raw bytes off `reader` until the blank line terminating the request
/// headers, under a timeout, then parses them with `httparse`.
pub async fn read_request(
    reader: &mut (impl AsyncReadExt + Unpin),
) -> Result<HandshakeRequest, Error> {
    let mut buf = Vec::new();
    let read_headers = async {
        loop {
            if buf.len() > MAX_HEADER_BYTES {
                return Err(Error::IncompleteHttpRequest);
            }
            let mut chunk = [0u8; 1024];
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                return Err(Error::IncompleteHttpRequest);
            }
            buf.extend_from_slice(&chunk[..n]);
            if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                return Ok(());
            }
        }
    };
    timeout(HEADER_READ_TIMEOUT, read_headers)
        .await
        .map_err(|_| Error::IncompleteHttpRequest)??;

    let mut header_storage = [httparse::EMPTY_HEADER; 32];
    let mut request = httparse::Request::new(&mut header_storage);
    match request.parse(&buf)? {
        httparse::Status::Complete(_) => {}
        httparse::Status::Partial => return Err(Error::IncompleteHttpRequest),
    }

    if request.method != Some("GET") {
        return Err(Error::InvalidHttpMethod);
    }

    let header_value = |name: &str| -> Option<String> {
        request
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| String::from_utf8_lossy(h.value).trim().to_string())
    };

    let upgrade = header_value("Upgrade").unwrap_or_default();
    if !upgrade.eq_ignore_ascii_case("websocket") {
        return Err(Error::NoUpgradeHeaderPresent);
    }

    let sec_websocket_version = header_value("Sec-WebSocket-Version")
        .ok_or(Error::InvalidVersionHeader)?;
    if sec_websocket_version != "8" && sec_websocket_version != "13" {
        return Err(Error::InvalidVersionHeader);
    }

    let sec_websocket_key = header_value("Sec-WebSocket-Key").ok_or(Error::InvalidSecWebsocketKey)?;
    if !is_valid_key(&sec_websocket_key) {
        return Err(Error::InvalidSecWebsocketKey);
    }

    Ok(HandshakeRequest {
        sec_websocket_key,
        sec_websocket_version,
        sec_websocket_protocol: header_value("Sec-WebSocket-Protocol"),
    })
}

/// `^[+/0-9A-Za-z]{22}==$`, checked by hand rather than pulling in a regex
/// dependency the rest of the pack doesn't carry for this.
fn is_valid_key(key: &str) -> bool {
    let bytes = key.as_bytes();
    bytes.len() == 24
        && bytes[..22]
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || *b == b'+' || *b == b'/')
        && &bytes[22..] == b"=="
}

pub fn accept_value(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(ACCEPT_GUID.as_bytes());
    BASE64_STANDARD.encode(sha1.finalize())
}

/// Builds the literal 101 response spec §4.5/§6 names, including the
/// `(MARK-46)` status-line marker carried over from the original service.
pub fn success_response(key: &str, protocol: Option<&str>, peer_id: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols (MARK-46)\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         Sec-WebSocket-Protocol: {}\r\n\
         Sec-WebSocket-ID: {}\r\n\r\n",
        accept_value(key),
        protocol.unwrap_or("undefined"),
        peer_id,
    )
}

fn status_text(code: u16) -> &'static str {
    match code {
        400 => "Bad Request",
        503 => "Service Unavailable",
        _ => "Error",
    }
}

/// `HTTP/1.1 {code} {STATUS_TEXT} (MARK-46)\r\nConnection: close\r\n...`, per
/// spec §6's verbatim failure-response format.
pub fn failure_response(code: u16) -> String {
    let body = status_text(code);
    format!(
        "HTTP/1.1 {} {} (MARK-46)\r\n\
         Connection: close\r\n\
         Content-Type: text/html\r\n\
         Content-Length: {}\r\n\r\n{}",
        code,
        body,
        body.len(),
        body,
    )
}

pub async fn write_response(
    writer: &mut (impl tokio::io::AsyncWriteExt + Unpin),
    response: &str,
) -> Result<(), Error> {
    writer.write_all(response.as_bytes()).await?;
    Ok(())
}
