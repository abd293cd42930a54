use clap::Parser;
use media_proxy_server::proxy::ProxyServer;
use media_proxy_server::ProxyConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ProxyConfig::parse();
    let server = ProxyServer::new(config).await?;
    server.run().await?;

    Ok(())
}
