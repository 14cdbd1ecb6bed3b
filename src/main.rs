use signal_relay::config::ServerOptions;
use signal_relay::server::ServerFacade;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let options = ServerOptions::from_env();
    let tls_acceptor = options
        .tls
        .then(|| options.tls_params.clone())
        .flatten()
        .map(|tls_params| TlsAcceptor::from(tls_params.rustls_config));

    let facade = Arc::new(ServerFacade::new(options));
    facade.run(tls_acceptor).await?;
    Ok(())
}
