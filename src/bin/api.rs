use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wealth_advisor_orchestrator::{
    agent::Orchestrator, api::start_server, config::OrchestratorConfig,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("Wealth Advisor Orchestrator - API Server");
    info!("Port: {}", api_port);

    let config = OrchestratorConfig::from_env()?;

    let orchestrator = Arc::new(Orchestrator::from_config(&config)?);

    info!("Orchestrator initialized");

    start_server(orchestrator, api_port).await?;

    Ok(())
}
