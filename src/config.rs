use pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig as RustlsConfig;
use std::fs::File;
use std::io::{self, BufReader, ErrorKind};
use std::path::Path;
use std::sync::Arc;

/// Parameters for a TLS listener, modeled on the teacher's own
/// `ServerConfig::tls_config` field (`tokio-rustls`/`rustls`).
#[derive(Clone)]
pub struct TlsParams {
    pub rustls_config: Arc<RustlsConfig>,
}

impl std::fmt::Debug for TlsParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsParams").finish_non_exhaustive()
    }
}

impl TlsParams {
    /// Builds a server TLS config from a PEM certificate chain and private
    /// key on disk, the way the teacher's TLS example binaries load theirs.
    pub fn from_pem_files(cert_path: &Path, key_path: &Path) -> io::Result<Self> {
        let certs = load_certs(cert_path)?;
        let key = load_key(key_path)?;
        let config = RustlsConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
        Ok(Self {
            rustls_config: Arc::new(config),
        })
    }
}

fn load_certs(path: &Path) -> io::Result<Vec<CertificateDer<'static>>> {
    rustls_pemfile::certs(&mut BufReader::new(File::open(path)?)).collect()
}

fn load_key(path: &Path) -> io::Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut BufReader::new(File::open(path)?))?
        .ok_or_else(|| io::Error::new(ErrorKind::Other, "no private key found"))
}

/// Configuration surface spec §3/§6 names: `host`, `port`, `tls`,
/// `tls_params`, `max_payload`, `max_clients`.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub tls_params: Option<TlsParams>,
    /// Bytes; `0` disables the running-total check in `FrameReceiver`.
    pub max_payload: u64,
    pub max_clients: u32,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
            tls: false,
            tls_params: None,
            max_payload: 64 << 20,
            max_clients: 10_000,
        }
    }
}

impl ServerOptions {
    /// Reads `SIGNAL_HOST`/`SIGNAL_PORT`/`SIGNAL_MAX_PAYLOAD`/
    /// `SIGNAL_MAX_CLIENTS` over the defaults above, falling back silently on
    /// missing or unparsable values. Ambient convenience for the `main.rs`
    /// binary; not part of the wire protocol.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Ok(host) = std::env::var("SIGNAL_HOST") {
            options.host = host;
        }
        if let Ok(port) = std::env::var("SIGNAL_PORT") {
            if let Ok(port) = port.parse() {
                options.port = port;
            }
        }
        if let Ok(max_payload) = std::env::var("SIGNAL_MAX_PAYLOAD") {
            if let Ok(max_payload) = max_payload.parse() {
                options.max_payload = max_payload;
            }
        }
        if let Ok(max_clients) = std::env::var("SIGNAL_MAX_CLIENTS") {
            if let Ok(max_clients) = max_clients.parse() {
                options.max_clients = max_clients;
            }
        }
        options
    }
}
