use anyhow::Context;
use tracing::info;

use portal_server::config::AppConfig;
use portal_server::ingest::sweep::run_retention_sweep;
use portal_server::state::AppState;
use portal_server::{build_router, database, seed};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = AppConfig::load().context("Failed to load config")?;
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let db = database::init_db(&config.database.url)
        .await
        .context("Failed to connect to database")?;
    seed::seed_role_permissions(&db)
        .await
        .context("Failed to seed roles")?;
    seed::ensure_indexes(&db).await?;

    let state = AppState::new(db, config);

    // Runs until process exit.
    let _sweep_handle = tokio::spawn(run_retention_sweep(
        state.sessions.clone(),
        state.config.upload.retention(),
        state.config.upload.sweep_interval(),
    ));

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Server running at http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
