/// Server setup and initialization
///
/// Wires together all components: storage, registry, handler registry,
/// execution engine, messaging transport and HTTP routes. Provides the
/// application factory function for creating the Axum app.

use crate::{
    api::{
        automations::{create_automation_routes, AppState},
        triggers::{create_trigger_routes, TriggerAppState},
    },
    automation::{registry::AutomationRegistry, storage::AutomationStorage},
    config::Config,
    contact::ContactStorage,
    crm::DealStorage,
    messaging::{ChannelProfile, HttpMessageTransport, MessageTransport, TemplateStorage},
    runlog::RunLogStorage,
    runtime::{ExecutionEngine, HandlerRegistry, HandlerServices},
};
use anyhow::Result;
use axum::{routing::get, Router};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Create the main Axum application with all routes wired
pub async fn create_app(config: Config) -> Result<Router> {
    tracing::info!("📁 Ensuring data directory exists: {}", config.database.data_dir);
    std::fs::create_dir_all(&config.database.data_dir)
        .map_err(|e| anyhow::anyhow!("Failed to create data directory: {}", e))?;

    tracing::info!("🏗️ Opening SQLite database");
    let db_path = format!("{}/zapflow.db", config.database.data_dir);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(&db_path)
                .create_if_missing(true),
        )
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open database {}: {}", db_path, e))?;

    tracing::info!("📋 Initializing storage schemas");
    let automation_storage = AutomationStorage::new(pool.clone());
    automation_storage.init_schema().await?;
    let contact_storage = ContactStorage::new(pool.clone());
    contact_storage.init_schema().await?;
    let run_log_storage = RunLogStorage::new(pool.clone());
    run_log_storage.init_schema().await?;
    let deal_storage = DealStorage::new(pool.clone());
    deal_storage.init_schema().await?;
    let template_storage = TemplateStorage::new(pool);
    template_storage.init_schema().await?;

    tracing::info!("📊 Initializing automation registry");
    let registry = Arc::new(AutomationRegistry::new(automation_storage.clone()));

    tracing::info!("📥 Loading existing automations from storage");
    registry
        .init_from_storage()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load automations from storage: {}", e))?;

    tracing::info!("📨 Initializing messaging transport");
    let transport: Arc<dyn MessageTransport> =
        Arc::new(HttpMessageTransport::new(config.messaging.clone()));

    tracing::info!("⚙️ Registering action handlers");
    let handlers = Arc::new(HandlerRegistry::builtin(HandlerServices {
        contacts: contact_storage.clone(),
        templates: template_storage,
        deals: deal_storage,
        transport,
        http: reqwest::Client::new(),
    }));

    tracing::info!("🚀 Initializing execution engine");
    let engine = Arc::new(ExecutionEngine::new(handlers, run_log_storage.clone()));

    let profile = ChannelProfile {
        id: "default".to_string(),
        team_id: "default".to_string(),
        phone_number_id: config.messaging.phone_number_id.clone(),
    };

    let app_state = AppState {
        storage: automation_storage,
        registry,
        run_logs: run_log_storage,
    };

    let trigger_state = TriggerAppState {
        app_state: app_state.clone(),
        engine,
        contacts: contact_storage,
        profile,
    };

    tracing::info!("📡 Creating HTTP router with all endpoints");
    let app = Router::new()
        .route("/healthz", get(health_check))
        .merge(create_automation_routes().with_state(app_state))
        .merge(create_trigger_routes().with_state(trigger_state));

    tracing::info!("✅ Application initialized successfully");

    Ok(app)
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    let app = create_app(config.clone()).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

/// Simple health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
