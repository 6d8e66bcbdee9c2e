//! Document retrieval (RAG) over the advisory knowledge base
//!
//! The vector store is an external service; this adapter only posts the
//! question and receives scored chunks with citations.

use super::http::{self, Expect};
use super::{ToolAdapter, MAX_RESULTS_PER_SOURCE};
use crate::error::AdapterError;
use crate::models::{Question, RawPayload, SourceKind};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

pub struct DocumentRetrievalTool {
    client: Client,
    endpoint: Option<String>,
}

impl DocumentRetrievalTool {
    pub fn new(client: Client, endpoint: Option<String>) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait::async_trait]
impl ToolAdapter for DocumentRetrievalTool {
    fn source_kind(&self) -> SourceKind {
        SourceKind::Document
    }

    fn description(&self) -> &'static str {
        "Retrieve passages from the wealth management knowledge base"
    }

    async fn invoke(
        &self,
        question: &Question,
        timeout: Duration,
    ) -> Result<RawPayload, AdapterError> {
        let endpoint = self.endpoint.as_deref().ok_or_else(|| {
            AdapterError::Validation("DOCUMENT_RETRIEVAL_URL is not configured".to_string())
        })?;

        let request = self.client.post(endpoint).json(&json!({
            "query": question.text(),
            "top_k": MAX_RESULTS_PER_SOURCE,
        }));

        http::send(request, timeout, Expect::Json).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_endpoint_is_validation_error() {
        let tool = DocumentRetrievalTool::new(Client::new(), None);
        let result = tool
            .invoke(&Question::new("rebalancing policy"), Duration::from_secs(1))
            .await;

        assert!(matches!(result, Err(AdapterError::Validation(_))));
    }
}
