//! Main orchestrator
//!
//! QUESTION → CLASSIFY → RESOLVE → FAN-OUT → NORMALIZE → COMBINE → SYNTHESIZE

use crate::audit::UsageAnalytics;
use crate::classifier::QueryClassifier;
use crate::config::OrchestratorConfig;
use crate::context::{ContextNormalizer, ResponseCombiner};
use crate::error::OrchestrationError;
use crate::execution::{FanOutExecutor, RetryPolicy};
use crate::gemini::GeminiClient;
use crate::models::{Capability, ContextBundle, QueryResponse, Question, ToolInvocation};
use crate::synthesis::{LanguageModel, SynthesisGateway};
use crate::tools::{create_default_registry, CircuitBreaker, ToolRegistry};
use crate::Result;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything gathered for one question before synthesis
#[derive(Debug, Clone, Serialize)]
pub struct GatheredContext {
    pub tags: BTreeSet<Capability>,
    pub invocations: Vec<ToolInvocation>,
    pub bundle: ContextBundle,
    /// The fan-out stopped early; `bundle` only covers settled invocations
    pub cancelled: bool,
}

/// Coordinates the request workflow. Shared across requests; only the
/// registry health flags, circuit counters and analytics are mutable.
pub struct Orchestrator {
    registry: ToolRegistry,
    executor: FanOutExecutor,
    breaker: CircuitBreaker,
    normalizer: ContextNormalizer,
    combiner: ResponseCombiner,
    gateway: SynthesisGateway,
    analytics: UsageAnalytics,
    circuit_cooldown: Duration,
}

impl Orchestrator {
    pub fn new(
        config: &OrchestratorConfig,
        registry: ToolRegistry,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        Self::with_retry_policy(config, registry, model, RetryPolicy::from_config(&config.retry))
    }

    pub fn with_retry_policy(
        config: &OrchestratorConfig,
        registry: ToolRegistry,
        model: Arc<dyn LanguageModel>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            executor: FanOutExecutor::new(retry),
            breaker: CircuitBreaker::new(config.circuit_breaker),
            normalizer: ContextNormalizer::new(),
            combiner: ResponseCombiner::from_config(config),
            gateway: SynthesisGateway::new(model, config.synthesis_timeout),
            analytics: UsageAnalytics::new(),
            circuit_cooldown: config.circuit_breaker.cooldown,
        }
    }

    /// Production wiring: HTTP adapters plus the Gemini backend.
    pub fn from_config(config: &OrchestratorConfig) -> Result<Self> {
        config.validate()?;

        let registry = create_default_registry(config)?;
        let api_key = config.endpoints.gemini_api_key.clone().unwrap_or_else(|| {
            warn!("GEMINI_API_KEY not set; synthesis will fail until it is configured");
            String::new()
        });
        let model = Arc::new(GeminiClient::new(api_key)?);

        Ok(Self::new(config, registry, model))
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn analytics(&self) -> &UsageAnalytics {
        &self.analytics
    }

    /// Default window for manual and automatic disables
    pub fn circuit_cooldown(&self) -> Duration {
        self.circuit_cooldown
    }

    /// Answer a question.
    pub async fn query(&self, question: &str, include_context: bool) -> Result<QueryResponse> {
        self.query_with_cancel(question, include_context, &CancellationToken::new())
            .await
    }

    /// Answer a question unless `cancel` fires first.
    pub async fn query_with_cancel(
        &self,
        question: &str,
        include_context: bool,
        cancel: &CancellationToken,
    ) -> Result<QueryResponse> {
        let start = Instant::now();
        let question = Question::new(question);
        let category = QueryClassifier::categorize(question.text());

        info!(
            correlation_id = %question.id(),
            category = %category,
            question = %question.text(),
            "Received question"
        );

        let gathered = self.gather(&question, cancel).await;
        if gathered.cancelled {
            self.analytics.record_failure(category).await;
            return Err(OrchestrationError::Cancelled);
        }

        let synthesis = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(OrchestrationError::Cancelled),
            result = self.gateway.synthesize(&question, &gathered.bundle) => result,
        };

        let synthesis = match synthesis {
            Ok(synthesis) => synthesis,
            Err(e) => {
                self.analytics.record_failure(category).await;
                return Err(e);
            }
        };

        let processing_time_ms = start.elapsed().as_millis() as u64;
        self.analytics
            .record_success(category, &synthesis.tools_used, processing_time_ms)
            .await;

        info!(
            correlation_id = %question.id(),
            tools_used = ?synthesis.tools_used,
            confidence = synthesis.confidence,
            processing_time_ms,
            "Question answered"
        );

        Ok(QueryResponse {
            correlation_id: question.id(),
            question: question.text().to_string(),
            answer: synthesis.answer_text,
            tools_used: synthesis.tools_used,
            confidence: synthesis.confidence,
            category,
            context: include_context.then_some(gathered.bundle),
            processing_time_ms,
        })
    }

    /// Classify, fan out and combine. Never fails: tool trouble shows up as
    /// invocation status and a lower confidence.
    pub async fn gather(&self, question: &Question, cancel: &CancellationToken) -> GatheredContext {
        let tags = QueryClassifier::classify(question);
        let mut tools = self.registry.resolve(&tags).await;
        if tools.is_empty() {
            // Nothing serves the tags; widen to every available tool.
            let every: BTreeSet<Capability> = Capability::ALL.into_iter().collect();
            tools = self.registry.resolve(&every).await;
            warn!(
                correlation_id = %question.id(),
                tags = ?tags,
                fallback_tools = tools.len(),
                "No available tool for the classified tags"
            );
        }

        debug!(
            correlation_id = %question.id(),
            tags = ?tags,
            tools = ?tools.iter().map(|t| t.spec.id.as_str()).collect::<Vec<_>>(),
            "Routed question"
        );

        let invocations = self.executor.execute_with_cancel(&tools, question, cancel).await;
        let cancelled = cancel.is_cancelled();

        let tripped = self.breaker.observe(&self.registry, &invocations).await;
        if !tripped.is_empty() {
            warn!(correlation_id = %question.id(), tripped = ?tripped, "Tools taken out of rotation");
        }

        let records = self.normalizer.normalize_all(&invocations);
        let invoked: Vec<String> = invocations.iter().map(|i| i.tool_id.clone()).collect();
        let bundle = self.combiner.combine(records, &invoked);

        debug!(
            correlation_id = %question.id(),
            records = bundle.records.len(),
            tools_used = ?bundle.tools_used,
            confidence = bundle.overall_confidence,
            "Context combined"
        );

        GatheredContext {
            tags,
            invocations,
            bundle,
            cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdapterError;
    use crate::models::{InvocationStatus, RawPayload, SourceKind, ToolSpec};
    use crate::tools::ToolAdapter;
    use serde_json::json;

    struct DocsTool;

    #[async_trait::async_trait]
    impl ToolAdapter for DocsTool {
        fn source_kind(&self) -> SourceKind {
            SourceKind::Document
        }

        fn description(&self) -> &'static str {
            "docs"
        }

        async fn invoke(
            &self,
            _question: &Question,
            _timeout: Duration,
        ) -> std::result::Result<RawPayload, AdapterError> {
            Ok(RawPayload::Json(json!({
                "chunks": [{"text": "Diversify across asset classes.", "source": "guide.pdf", "page": 2, "score": 0.8}]
            })))
        }
    }

    struct EchoModel;

    #[async_trait::async_trait]
    impl LanguageModel for EchoModel {
        async fn generate(&self, _system: &str, prompt: &str) -> Result<String> {
            Ok(format!("answered {} chars", prompt.len()))
        }
    }

    fn orchestrator() -> Orchestrator {
        let config = OrchestratorConfig::default();
        let mut registry = ToolRegistry::new();
        registry.register(
            ToolSpec {
                id: "rag_query".to_string(),
                capabilities: vec![Capability::Document],
                enabled: true,
                timeout: Duration::from_secs(1),
                max_retries: 0,
            },
            Arc::new(DocsTool),
        );
        Orchestrator::with_retry_policy(&config, registry, Arc::new(EchoModel), RetryPolicy::immediate())
    }

    #[tokio::test]
    async fn test_query_includes_context_on_request() {
        let orchestrator = orchestrator();

        let response = orchestrator
            .query("How should I diversify my portfolio?", true)
            .await
            .unwrap();

        assert_eq!(response.tools_used, vec!["rag_query".to_string()]);
        assert!(response.confidence > 0.0);
        assert_eq!(response.context.unwrap().records.len(), 1);

        let without = orchestrator.query("How should I diversify?", false).await.unwrap();
        assert!(without.context.is_none());

        let stats = orchestrator.analytics().snapshot().await;
        assert_eq!(stats.successful_queries, 2);
        assert_eq!(stats.most_used_tools["rag_query"], 2);
    }

    #[tokio::test]
    async fn test_gather_reports_invocations() {
        let orchestrator = orchestrator();
        let gathered = orchestrator
            .gather(&Question::new("retirement plan"), &CancellationToken::new())
            .await;

        assert!(!gathered.cancelled);
        assert_eq!(gathered.invocations.len(), 1);
        assert_eq!(gathered.invocations[0].status, InvocationStatus::Success);
    }

    #[tokio::test]
    async fn test_unserved_tags_fall_back_to_available_tools() {
        let config = OrchestratorConfig::default();
        let mut registry = ToolRegistry::new();
        registry.register(
            ToolSpec {
                id: "rag_query".to_string(),
                capabilities: vec![Capability::Document],
                enabled: false,
                timeout: Duration::from_secs(1),
                max_retries: 0,
            },
            Arc::new(DocsTool),
        );
        registry.register(
            ToolSpec {
                id: "arxiv_search".to_string(),
                capabilities: vec![Capability::Academic],
                enabled: true,
                timeout: Duration::from_secs(1),
                max_retries: 0,
            },
            Arc::new(DocsTool),
        );
        let orchestrator =
            Orchestrator::with_retry_policy(&config, registry, Arc::new(EchoModel), RetryPolicy::immediate());

        let gathered = orchestrator
            .gather(&Question::new("hello"), &CancellationToken::new())
            .await;

        assert_eq!(gathered.tags, [Capability::Document].into_iter().collect());
        let ids: Vec<&str> = gathered.invocations.iter().map(|i| i.tool_id.as_str()).collect();
        assert_eq!(ids, vec!["arxiv_search"]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let orchestrator = orchestrator();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = orchestrator.query_with_cancel("retirement plan", true, &cancel).await;
        assert!(matches!(result, Err(OrchestrationError::Cancelled)));
        assert_eq!(orchestrator.analytics().snapshot().await.failed_queries, 1);
    }
}
