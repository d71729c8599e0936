use throttler::config::Config;
use throttler::server::Server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    tracing::info!(bind_address = %config.bind_address, "loaded configuration");

    let server = Server::new(config)?;
    server.run().await
}
