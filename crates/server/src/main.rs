use imagebatch::api;
use imagebatch::config;
use imagebatch::db;

use imagebatch::jobs::policy::CompletionPolicy;
use imagebatch::jobs::runner::JobRunner;
use imagebatch::store::{BlobStore, KeyStore};
use imagebatch::vendor::GeminiBatchClient;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imagebatch=info,server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = config::Config::from_env()?;

    tracing::info!(
        addr = %cfg.addr,
        data_dir = %cfg.data_dir.display(),
        model = %cfg.model,
        key_file = %cfg.env_file.display(),
        migrate_on_startup = cfg.migrate_on_startup,
        failure_ratio = cfg.failure_ratio,
        "imagebatch starting"
    );

    let pool = db::make_pool(&cfg.database_url).await?;
    if cfg.migrate_on_startup {
        db::run_migrations(&pool).await?;
    }

    let blobs = BlobStore::new(&cfg.data_dir);
    blobs.ensure_dirs().await?;

    let keys = KeyStore::new(&cfg.env_file);
    if keys.get().is_none() {
        tracing::warn!(path = %cfg.env_file.display(), "no API key configured; job creation will fail until one is set");
    }

    let vendor = Arc::new(GeminiBatchClient::new(
        &cfg.api_base,
        &cfg.model,
        keys.clone(),
    )?);
    let runner = JobRunner::new(
        pool.clone(),
        vendor,
        keys,
        blobs,
        cfg.data_dir.clone(),
        CompletionPolicy::new(cfg.failure_ratio),
    );

    let app = api::router(api::ApiState {
        runner,
        max_upload_bytes: cfg.max_upload_bytes,
    });

    let listener = tokio::net::TcpListener::bind(&cfg.addr).await?;
    tracing::info!("listening on http://{}", cfg.addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
