use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use librag::api::{self, AppState};
use librag::config::ServiceConfig;
use librag::fetch::BlobFetcher;
use librag::store::embedder::{Embedder, model_assets_present};
use librag::store::LanceLibraryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServiceConfig::from_env()?;
    info!(db_path = %config.db_path, "starting librag");

    // Bootstrap: make sure embedding-model assets exist on disk before the
    // server accepts traffic. First run downloads them.
    if !model_assets_present(&config.model_cache_dir) {
        info!(
            cache_dir = %config.model_cache_dir.display(),
            model = %config.default_embedding_model,
            "embedding model assets missing, downloading"
        );
        std::fs::create_dir_all(&config.model_cache_dir)?;
    }
    let cache_dir = config.model_cache_dir.clone();
    let model_name = config.default_embedding_model.clone();
    let bootstrap =
        tokio::task::spawn_blocking(move || Embedder::with_model(&cache_dir, &model_name))
            .await??;
    info!(
        model = bootstrap.model_name(),
        dimension = bootstrap.dimension(),
        "embedding model ready"
    );

    let store = Arc::new(
        LanceLibraryStore::new(
            &config.db_path,
            config.model_cache_dir.clone(),
            bootstrap,
        )
        .await?,
    );
    let fetcher = BlobFetcher::new(config.staging_dir.clone(), config.fetch_timeout)?;
    let state = AppState::new(store, fetcher, config.default_embedding_model.clone());

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down");
}
