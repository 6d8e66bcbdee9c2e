//! Resolved orchestrator configuration
//!
//! The core only reads `OrchestratorConfig`. `from_env` is the loader used by
//! the binaries: defaults, then environment variables (after `dotenv`).

use crate::error::OrchestrationError;
use crate::models::{duration_ms, Capability, ToolSpec};
use crate::tools::{ACADEMIC_SEARCH_ID, DOCUMENT_RETRIEVAL_ID, MARKET_DATA_ID, WEB_SEARCH_ID};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_TOOL_TIMEOUT_MS: u64 = 8_000;
const DEFAULT_TOOL_MAX_RETRIES: u32 = 2;
const DEFAULT_MAX_CONTEXT_RECORDS: usize = 10;
const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
const DEFAULT_COOLDOWN_SECS: u64 = 60;
const DEFAULT_SYNTHESIS_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 200;
const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 2_000;

/// Longest cooldown a tool can be taken out of routing for
pub const MAX_COOLDOWN: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub const DEFAULT_ARXIV_API_URL: &str = "https://export.arxiv.org/api/query";
pub const DEFAULT_MARKET_DATA_URL: &str = "https://query1.finance.yahoo.com/v7/finance/quote";

/// Relative weights of the two confidence factors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ConfidenceWeights {
    /// Weight of the fraction of invoked tools that produced evidence
    pub success: f64,
    /// Weight of the per-tool mean relevance
    pub relevance: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            success: 0.5,
            relevance: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    #[serde(with = "duration_ms")]
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown: Duration::from_secs(DEFAULT_COOLDOWN_SECS),
        }
    }
}

/// Backoff between retry attempts (doubling, capped).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    #[serde(with = "duration_ms")]
    pub base_delay: Duration,
    #[serde(with = "duration_ms")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS),
        }
    }
}

/// Where the concrete adapters reach their services.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AdapterEndpoints {
    #[serde(skip_serializing)]
    pub tavily_api_key: Option<String>,
    pub arxiv_api_url: String,
    pub market_data_url: String,
    pub document_retrieval_url: Option<String>,
    #[serde(skip_serializing)]
    pub gemini_api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Tool descriptors in routing order
    pub tools: Vec<ToolSpec>,
    pub max_context_records: usize,
    pub confidence: ConfidenceWeights,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryConfig,
    #[serde(with = "duration_ms")]
    pub synthesis_timeout: Duration,
    pub endpoints: AdapterEndpoints,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        let timeout = Duration::from_millis(DEFAULT_TOOL_TIMEOUT_MS);
        let tool = |id: &str, capability: Capability| ToolSpec {
            id: id.to_string(),
            capabilities: vec![capability],
            enabled: true,
            timeout,
            max_retries: DEFAULT_TOOL_MAX_RETRIES,
        };

        Self {
            tools: vec![
                tool(WEB_SEARCH_ID, Capability::Web),
                tool(ACADEMIC_SEARCH_ID, Capability::Academic),
                tool(MARKET_DATA_ID, Capability::MarketData),
                tool(DOCUMENT_RETRIEVAL_ID, Capability::Document),
            ],
            max_context_records: DEFAULT_MAX_CONTEXT_RECORDS,
            confidence: ConfidenceWeights::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
            synthesis_timeout: Duration::from_secs(DEFAULT_SYNTHESIS_TIMEOUT_SECS),
            endpoints: AdapterEndpoints {
                tavily_api_key: None,
                arxiv_api_url: DEFAULT_ARXIV_API_URL.to_string(),
                market_data_url: DEFAULT_MARKET_DATA_URL.to_string(),
                document_retrieval_url: None,
                gemini_api_key: None,
            },
        }
    }
}

impl OrchestratorConfig {
    /// Build a configuration from environment variables on top of defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        config.endpoints.tavily_api_key = non_empty_var("TAVILY_API_KEY");
        config.endpoints.document_retrieval_url = non_empty_var("DOCUMENT_RETRIEVAL_URL");
        config.endpoints.gemini_api_key = non_empty_var("GEMINI_API_KEY");
        if let Some(url) = non_empty_var("ARXIV_API_URL") {
            config.endpoints.arxiv_api_url = url;
        }
        if let Some(url) = non_empty_var("MARKET_DATA_URL") {
            config.endpoints.market_data_url = url;
        }

        let default_timeout = parse_var::<u64>("TOOL_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(DEFAULT_TOOL_TIMEOUT_MS));
        let default_retries =
            parse_var::<u32>("TOOL_MAX_RETRIES")?.unwrap_or(DEFAULT_TOOL_MAX_RETRIES);

        let has_tavily = config.endpoints.tavily_api_key.is_some();
        let has_documents = config.endpoints.document_retrieval_url.is_some();

        for spec in &mut config.tools {
            // Keyed services stay off until their endpoint is configured.
            spec.enabled = match spec.id.as_str() {
                WEB_SEARCH_ID => has_tavily,
                DOCUMENT_RETRIEVAL_ID => has_documents,
                _ => true,
            };
            spec.timeout = default_timeout;
            spec.max_retries = default_retries;

            let prefix = format!("TOOL_{}", spec.id.to_uppercase());
            if let Some(enabled) = parse_var::<bool>(&format!("{}_ENABLED", prefix))? {
                spec.enabled = enabled;
            }
            if let Some(ms) = parse_var::<u64>(&format!("{}_TIMEOUT_MS", prefix))? {
                spec.timeout = Duration::from_millis(ms);
            }
            if let Some(retries) = parse_var::<u32>(&format!("{}_MAX_RETRIES", prefix))? {
                spec.max_retries = retries;
            }
        }

        if let Some(max) = parse_var("MAX_CONTEXT_RECORDS")? {
            config.max_context_records = max;
        }
        if let Some(w) = parse_var("CONFIDENCE_SUCCESS_WEIGHT")? {
            config.confidence.success = w;
        }
        if let Some(w) = parse_var("CONFIDENCE_RELEVANCE_WEIGHT")? {
            config.confidence.relevance = w;
        }
        if let Some(threshold) = parse_var("CIRCUIT_FAILURE_THRESHOLD")? {
            config.circuit_breaker.failure_threshold = threshold;
        }
        if let Some(secs) = parse_var::<u64>("CIRCUIT_COOLDOWN_SECS")? {
            config.circuit_breaker.cooldown = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>("SYNTHESIS_TIMEOUT_SECS")? {
            config.synthesis_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var::<u64>("RETRY_BASE_DELAY_MS")? {
            config.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>("RETRY_MAX_DELAY_MS")? {
            config.retry.max_delay = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_context_records == 0 {
            return Err(OrchestrationError::ConfigError(
                "max_context_records must be at least 1".to_string(),
            ));
        }

        let ConfidenceWeights { success, relevance } = self.confidence;
        if !success.is_finite() || !relevance.is_finite() || success < 0.0 || relevance < 0.0 {
            return Err(OrchestrationError::ConfigError(
                "confidence weights must be finite and non-negative".to_string(),
            ));
        }
        if success + relevance <= 0.0 {
            return Err(OrchestrationError::ConfigError(
                "at least one confidence weight must be positive".to_string(),
            ));
        }

        if let Some(spec) = self.tools.iter().find(|s| s.timeout.is_zero()) {
            return Err(OrchestrationError::ConfigError(format!(
                "tool '{}' has a zero timeout",
                spec.id
            )));
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(OrchestrationError::ConfigError(
                "circuit breaker failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.circuit_breaker.cooldown > MAX_COOLDOWN {
            return Err(OrchestrationError::ConfigError(format!(
                "circuit breaker cooldown must not exceed {}s",
                MAX_COOLDOWN.as_secs()
            )));
        }

        Ok(())
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match non_empty_var(key) {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|e| {
            OrchestrationError::ConfigError(format!("{} has invalid value '{}': {}", key, raw, e))
        }),
    }
}
