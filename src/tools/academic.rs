//! Academic paper search via the arXiv Atom API

use super::http::{self, Expect};
use super::{ToolAdapter, MAX_RESULTS_PER_SOURCE};
use crate::error::AdapterError;
use crate::models::{Question, RawPayload, SourceKind};
use reqwest::Client;
use std::time::Duration;

/// Terms kept from the question when building the arXiv query
const MAX_SEARCH_TERMS: usize = 8;

const STOPWORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does",
    "for", "from", "how", "i", "in", "is", "it", "me", "my", "of", "on", "or",
    "say", "should", "that", "the", "this", "to", "was", "what", "when", "which",
    "who", "why", "will", "with", "would", "you", "your",
];

pub struct ArxivSearchTool {
    client: Client,
    base_url: String,
}

impl ArxivSearchTool {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

/// Content words of the question, lowercased, stopwords removed.
pub fn search_terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();

    for word in text
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .map(|w| w.trim_matches('-').to_lowercase())
    {
        if word.len() < 2 || STOPWORDS.contains(&word.as_str()) || terms.contains(&word) {
            continue;
        }
        terms.push(word);
        if terms.len() == MAX_SEARCH_TERMS {
            break;
        }
    }

    terms
}

#[async_trait::async_trait]
impl ToolAdapter for ArxivSearchTool {
    fn source_kind(&self) -> SourceKind {
        SourceKind::Academic
    }

    fn description(&self) -> &'static str {
        "Search arXiv for research papers on finance, investing and economics"
    }

    async fn invoke(
        &self,
        question: &Question,
        timeout: Duration,
    ) -> Result<RawPayload, AdapterError> {
        let terms = search_terms(question.text());
        if terms.is_empty() {
            return Err(AdapterError::Validation(
                "no searchable terms in question".to_string(),
            ));
        }

        let search_query = format!("all:{}", terms.join(" "));
        let max_results = MAX_RESULTS_PER_SOURCE.to_string();
        let request = self.client.get(&self.base_url).query(&[
            ("search_query", search_query.as_str()),
            ("start", "0"),
            ("max_results", max_results.as_str()),
            ("sortBy", "submittedDate"),
            ("sortOrder", "descending"),
        ]);

        http::send(request, timeout, Expect::Text).await
    }
}
