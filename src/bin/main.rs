use tracing::info;
use tracing_subscriber::EnvFilter;
use wealth_advisor_orchestrator::{agent::Orchestrator, config::OrchestratorConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let question = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if question.trim().is_empty() {
        eprintln!("usage: orchestrator <question>");
        std::process::exit(2);
    }

    info!("Wealth Advisor Orchestrator starting");

    let config = OrchestratorConfig::from_env()?;
    let orchestrator = Orchestrator::from_config(&config)?;

    // Ctrl-C cancels the in-flight request.
    let cancel = tokio_util::sync::CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    match orchestrator.query_with_cancel(&question, true, &cancel).await {
        Ok(result) => {
            println!("\n=== ANSWER ===");
            println!("{}", result.answer);
            println!("\nCategory: {}", result.category);
            println!("Confidence: {:.2}", result.confidence);
            println!("Tools used: {}", result.tools_used.join(", "));
            println!("Processing time: {} ms", result.processing_time_ms);

            if let Some(context) = result.context {
                println!("\nSources:");
                for (i, record) in context.records.iter().enumerate() {
                    println!(
                        "  [{}] {} ({}, {:.2}) {}",
                        i + 1,
                        record.title,
                        record.source_tool,
                        record.relevance_score,
                        record.url_or_reference
                    );
                }
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Query failed: {}", e);
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}
