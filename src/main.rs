/// Relayflow: workflow-automation engine
///
/// Main entry point. The server provides:
/// - Workflow management API at /api/workflows/*
/// - Run history and cancellation at /api/runs/*
/// - Webhook triggers at /webhook/{workflow_id}
/// - Health check at /healthz
use relayflow::{config::Config, server::start_server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    start_server(config).await?;
    Ok(())
}
