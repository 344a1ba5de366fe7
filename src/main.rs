use anyhow::Result;
use song_feed::{
    app,
    config::AppConfig,
    db,
    services::storage_gateway::StorageGateway,
    state::AppState,
    storage::memory::MemoryStore,
};
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting song-feed with config: {:?}", cfg);

    // --- Initialize SQLite connection + schema ---
    let db = db::connect(&cfg.database_url).await?;
    db::run_migrations(&db).await?;

    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize storage gateway ---
    let gateway = if cfg.memory_store {
        let bucket = cfg.storage.bucket.clone().unwrap_or_else(|| "songs".into());
        // objects are only reachable through this server's /files route
        let endpoint = format!("http://localhost:{}/files", cfg.port);
        tracing::warn!("Using in-memory object store; uploads are lost on exit");
        let gateway = StorageGateway::new(Arc::new(MemoryStore::new()), bucket, endpoint);
        gateway.ensure_bucket().await;
        gateway
    } else {
        StorageGateway::connect(&cfg.storage).await
    };

    // --- Build router ---
    let router = app(AppState { gateway, db }, cfg.max_upload_bytes);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router).await?;

    Ok(())
}
