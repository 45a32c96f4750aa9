use gatekeeper::config::Config;
use gatekeeper::server::Gateway;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;
    let gateway = Gateway::bind(&cfg).await?;
    let shutdown = gateway.shutdown_token();

    tokio::select! {
        _ = gateway.run() => {}

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            shutdown.cancel();
        }
    }

    Ok(())
}
