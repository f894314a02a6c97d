/// Server setup and initialization
///
/// Wires together storage, registries, the run coordinator, the scheduler and
/// the HTTP routes. Two SQLite databases: engine.db holds definitions,
/// variables and the execution trace; datastore.db is the application data
/// store the database_query handler targets.

use crate::{
    api::{create_run_routes, create_webhook_routes, create_workflow_routes, workflows::AppState},
    config::Config,
    runtime::{
        handlers::register_builtins, CronSchedulerService, HandlerRegistry, RunCoordinator,
        SqliteRecorder,
    },
    workflow::{registry::WorkflowRegistry, storage::WorkflowStorage},
};
use anyhow::Result;
use axum::{routing::get, Router};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Create the main Axum application with all routes wired up
pub async fn create_app(config: Config) -> Result<Router> {
    tracing::info!("📁 Ensuring data directory exists: {}", config.database.data_dir);
    std::fs::create_dir_all(&config.database.data_dir)?;

    tracing::info!("🗃️ Opening engine database");
    let engine_pool = open_pool(&config.database.data_dir, "engine.db").await?;
    tracing::info!("🗃️ Opening application data store");
    let data_pool = open_pool(&config.database.data_dir, "datastore.db").await?;

    let storage = WorkflowStorage::new(engine_pool.clone());
    storage.init_schema().await?;

    let recorder = SqliteRecorder::new(engine_pool);
    recorder.init_schema().await?;

    tracing::info!("📥 Loading workflows from storage");
    let registry = Arc::new(WorkflowRegistry::new(storage.clone()));
    registry.init_from_storage().await?;

    tracing::info!("🧩 Registering built-in node handlers");
    let mut handlers = HandlerRegistry::new();
    register_builtins(&mut handlers, data_pool);
    tracing::info!("🧩 Available node types: {:?}", handlers.type_ids());

    let coordinator = Arc::new(RunCoordinator::new(
        Arc::new(handlers),
        Arc::new(recorder.clone()),
        config.engine.worker_concurrency,
    ));

    tracing::info!("⏰ Initializing cron scheduler service");
    let scheduler = Arc::new(
        CronSchedulerService::new(Arc::clone(&registry), Arc::clone(&coordinator)).await?,
    );
    let scheduler_handle = Arc::clone(&scheduler);
    tokio::spawn(async move {
        if let Err(e) = scheduler_handle.start().await {
            tracing::error!("❌ Failed to start cron scheduler: {}", e);
        }
    });

    let state = AppState {
        storage,
        registry,
        scheduler,
        coordinator,
        recorder,
    };

    let app = Router::new()
        .route("/healthz", get(health_check))
        .merge(create_workflow_routes().with_state(state.clone()))
        .merge(create_run_routes().with_state(state.clone()))
        .merge(create_webhook_routes().with_state(state));

    tracing::info!("✅ Application initialized");
    Ok(app)
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting Relayflow server...");

    let app = create_app(config.clone()).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

async fn open_pool(data_dir: &str, file: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(format!("{data_dir}/{file}"))
        .create_if_missing(true);
    Ok(SqlitePool::connect_with(options).await?)
}

async fn health_check() -> &'static str {
    "ok"
}
