//! ImpulseGuard HTTP server entry point.

use impulseguard::config::Config;
use impulseguard::error::Result;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,impulseguard=debug".into()),
        )
        .init();

    let config = Config::load()?;
    impulseguard::run_server(config).await
}
