//! Tool adapter trait, registry and concrete adapters
//!
//! Every external information source sits behind `ToolAdapter`. Adapters are
//! stateless per call: they turn a question into a raw payload or fail with
//! an `AdapterError`. Retries, timeouts and health live outside them.

use crate::config::OrchestratorConfig;
use crate::error::{AdapterError, OrchestrationError};
use crate::models::{Question, RawPayload, SourceKind};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub mod academic;
pub mod circuit;
pub mod document;
mod http;
pub mod market_data;
pub mod registry;
pub mod web_search;

pub use academic::ArxivSearchTool;
pub use circuit::CircuitBreaker;
pub use document::DocumentRetrievalTool;
pub use market_data::YahooQuoteTool;
pub use registry::{cooldown_deadline, ResolvedTool, ToolRegistry};
pub use web_search::TavilySearchTool;

pub const WEB_SEARCH_ID: &str = "tavily_search";
pub const ACADEMIC_SEARCH_ID: &str = "arxiv_search";
pub const MARKET_DATA_ID: &str = "yfinance_data";
pub const DOCUMENT_RETRIEVAL_ID: &str = "rag_query";

/// Results requested from each search-style source
pub(crate) const MAX_RESULTS_PER_SOURCE: usize = 5;

/// Uniform interface over one external capability
#[async_trait::async_trait]
pub trait ToolAdapter: Send + Sync {
    /// Parsing rule the normalizer applies to this adapter's payloads
    fn source_kind(&self) -> SourceKind;

    fn description(&self) -> &'static str;

    /// One attempt. `timeout` is advisory for the underlying client; the
    /// executor enforces it independently.
    async fn invoke(
        &self,
        question: &Question,
        timeout: Duration,
    ) -> std::result::Result<RawPayload, AdapterError>;
}

/// Create a registry with the four HTTP-backed adapters, in configuration order.
pub fn create_default_registry(config: &OrchestratorConfig) -> Result<ToolRegistry> {
    let client = http::build_client()?;
    let endpoints = &config.endpoints;
    let mut registry = ToolRegistry::new();

    for spec in &config.tools {
        let adapter: Arc<dyn ToolAdapter> = match spec.id.as_str() {
            WEB_SEARCH_ID => Arc::new(TavilySearchTool::new(
                client.clone(),
                endpoints.tavily_api_key.clone(),
            )),
            ACADEMIC_SEARCH_ID => Arc::new(ArxivSearchTool::new(
                client.clone(),
                endpoints.arxiv_api_url.clone(),
            )),
            MARKET_DATA_ID => Arc::new(YahooQuoteTool::new(
                client.clone(),
                endpoints.market_data_url.clone(),
            )),
            DOCUMENT_RETRIEVAL_ID => Arc::new(DocumentRetrievalTool::new(
                client.clone(),
                endpoints.document_retrieval_url.clone(),
            )),
            other => {
                return Err(OrchestrationError::ConfigError(format!(
                    "no adapter available for tool '{}'",
                    other
                )))
            }
        };

        info!(
            tool_id = %spec.id,
            enabled = spec.enabled,
            timeout_ms = spec.timeout.as_millis() as u64,
            max_retries = spec.max_retries,
            "Registered tool"
        );
        registry.register(spec.clone(), adapter);
    }

    Ok(registry)
}
