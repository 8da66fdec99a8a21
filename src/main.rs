use sober_board::{router, AppState, Config, LocalStore, MemoryBackend};
use std::{net::SocketAddr, path::Path, sync::Arc};
use tokio::fs;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = Config::from_env()?;
    create_parent_dir(&config.device_state_path).await?;
    create_parent_dir(&config.backend_data_path).await?;

    let backend = Arc::new(MemoryBackend::open(config.backend_data_path.clone()).await);
    let local_store = Arc::new(LocalStore::open(config.device_state_path.clone()).await);
    let state = AppState::new(backend, local_store, config.period);

    info!(period = %config.period.label(), "restoring device sessions");
    state.restore_sessions().await;

    let app = router(state.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            state.shutdown().await;
        })
        .await?;

    info!("stopped");
    Ok(())
}

async fn create_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent).await,
        _ => Ok(()),
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
