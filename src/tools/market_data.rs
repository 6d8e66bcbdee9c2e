//! Market data lookup via the Yahoo Finance quote endpoint

use super::http::{self, Expect};
use super::ToolAdapter;
use crate::classifier::extract_tickers;
use crate::error::AdapterError;
use crate::models::{Question, RawPayload, SourceKind};
use reqwest::Client;
use std::time::Duration;

pub struct YahooQuoteTool {
    client: Client,
    base_url: String,
}

impl YahooQuoteTool {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait::async_trait]
impl ToolAdapter for YahooQuoteTool {
    fn source_kind(&self) -> SourceKind {
        SourceKind::MarketData
    }

    fn description(&self) -> &'static str {
        "Fetch current quotes and key metrics for ticker symbols in the question"
    }

    async fn invoke(
        &self,
        question: &Question,
        timeout: Duration,
    ) -> Result<RawPayload, AdapterError> {
        let symbols = extract_tickers(question.text());
        if symbols.is_empty() {
            return Err(AdapterError::Validation(
                "no ticker symbol found in question".to_string(),
            ));
        }

        let request = self
            .client
            .get(&self.base_url)
            .query(&[("symbols", symbols.join(","))]);

        http::send(request, timeout, Expect::Json).await
    }
}
