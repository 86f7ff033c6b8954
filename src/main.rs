/// Zapflow server entry point
///
/// Initializes logging and configuration, then starts the HTTP server:
/// - Automation management API at /api/automations/*
/// - Trigger ingestion at /trigger/{automation_id}/{node_id}
/// - Health check at /healthz

use zapflow::{config::Config, server::start_server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    // Configuration defaults with ZAPFLOW_* environment overrides
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
