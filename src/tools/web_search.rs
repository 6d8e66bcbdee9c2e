//! Web search via the Tavily API

use super::http::{self, Expect};
use super::{ToolAdapter, MAX_RESULTS_PER_SOURCE};
use crate::error::AdapterError;
use crate::models::{Question, RawPayload, SourceKind};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

pub const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";

pub struct TavilySearchTool {
    client: Client,
    api_key: Option<String>,
}

impl TavilySearchTool {
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }
}

#[async_trait::async_trait]
impl ToolAdapter for TavilySearchTool {
    fn source_kind(&self) -> SourceKind {
        SourceKind::WebSearch
    }

    fn description(&self) -> &'static str {
        "Search the web for current news, market updates and macro information"
    }

    async fn invoke(
        &self,
        question: &Question,
        timeout: Duration,
    ) -> Result<RawPayload, AdapterError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AdapterError::Validation("TAVILY_API_KEY is not configured".to_string()))?;

        let query = question.text().trim();
        if query.is_empty() {
            return Err(AdapterError::Validation("empty search query".to_string()));
        }

        let request = self.client.post(TAVILY_SEARCH_URL).json(&json!({
            "api_key": api_key,
            "query": query,
            "max_results": MAX_RESULTS_PER_SOURCE,
            "search_depth": "basic",
        }));

        http::send(request, timeout, Expect::Json).await
    }
}
