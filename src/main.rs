//! Binary entrypoint: boots the Axum HTTP server, wiring routes, shared
//! state, and middleware.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use whatson::telemetry::Metrics;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("whatson=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = whatson::AppConfig::from_env()?;
    let bind_addr = config.bind_addr.clone();
    tracing::info!(
        city = %config.city,
        mock_mode = config.mock_mode,
        models = ?config.model_candidates,
        "starting whatson"
    );

    let metrics = Metrics::init();
    let router = whatson::create_router(config).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(%bind_addr, "listening");
    axum::serve(listener, router).await?;
    Ok(())
}
