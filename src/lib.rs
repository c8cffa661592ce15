pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod sandbox;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use tokio::sync::watch;

use crate::core::{config::Settings, redis::RedisHandle, state::AppState, telemetry};
use crate::repositories::Repositories;
use crate::sandbox::ProcessSandbox;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let redis = RedisHandle::new(settings.redis().redis_url());
    if let Err(err) = redis.connect().await {
        tracing::error!(error = %err, "Failed to connect to Redis; code rate limiting disabled");
    } else {
        tracing::info!("Redis connected successfully");
    }

    let runner = Arc::new(ProcessSandbox::from_settings(&settings));
    let (state, queues) =
        AppState::new(settings, Repositories::postgres(db_pool), redis.clone(), runner);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = tasks::scheduler::spawn_workers(&state, queues, shutdown_rx);

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        "Examiner API listening"
    );

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(core::shutdown::shutdown_with_notify(shutdown_tx))
        .await;

    tasks::scheduler::join(workers).await;
    tracing::info!("Background workers stopped");

    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}
