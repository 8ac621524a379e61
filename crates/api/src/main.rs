use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;

use haulbase_api::app::{self, services::ServiceSettings, services::Stores};
use haulbase_api::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("HAULBASE_CONFIG").ok().map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref()).context("loading configuration")?;

    haulbase_observability::init_with(&config.log.level, config.log.format);

    if config.uses_dev_secret() {
        tracing::warn!("no JWT secret configured; using insecure dev default");
    }

    let stores = match &config.database.url {
        Some(url) => Stores::postgres(url, config.database.max_connections)
            .await
            .context("connecting to postgres")?,
        None => {
            tracing::warn!("no database configured; using in-memory stores");
            Stores::in_memory().0
        }
    };

    let settings = ServiceSettings::from_config(&config);
    let app = app::build_app(stores, &settings).context("building operation registry")?;

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("binding {}", config.server.bind))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(
        listener,
        app.router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("serving http")?;

    let stats = app.audit_worker.shutdown().await;
    tracing::info!(
        recorded = stats.recorded,
        failed = stats.failed,
        dropped = stats.dropped,
        "audit worker stopped"
    );

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
