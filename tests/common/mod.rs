//! In-process stand-ins for the external services.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use wealth_advisor_orchestrator::error::{AdapterError, OrchestrationError};
use wealth_advisor_orchestrator::execution::RetryPolicy;
use wealth_advisor_orchestrator::models::{Capability, Question, RawPayload, SourceKind, ToolSpec};
use wealth_advisor_orchestrator::synthesis::LanguageModel;
use wealth_advisor_orchestrator::tools::{ToolAdapter, ToolRegistry};
use wealth_advisor_orchestrator::{Orchestrator, OrchestratorConfig};

// =============================================================================
// Tools
// =============================================================================

#[derive(Clone)]
pub enum Reply {
    Payload(RawPayload),
    Fail(AdapterError),
    Hang,
}

pub struct StubTool {
    source: SourceKind,
    reply: Reply,
    pub calls: AtomicU32,
}

impl StubTool {
    pub fn new(source: SourceKind, reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            source,
            reply,
            calls: AtomicU32::new(0),
        })
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolAdapter for StubTool {
    fn source_kind(&self) -> SourceKind {
        self.source
    }

    fn description(&self) -> &'static str {
        "stub"
    }

    async fn invoke(&self, _question: &Question, _timeout: Duration) -> Result<RawPayload, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Reply::Payload(payload) => Ok(payload.clone()),
            Reply::Fail(err) => Err(err.clone()),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(RawPayload::Text(String::new()))
            }
        }
    }
}

pub fn spec(id: &str, capability: Capability, timeout_ms: u64, max_retries: u32) -> ToolSpec {
    ToolSpec {
        id: id.to_string(),
        capabilities: vec![capability],
        enabled: true,
        timeout: Duration::from_millis(timeout_ms),
        max_retries,
    }
}

// =============================================================================
// Language model
// =============================================================================

pub struct StubModel {
    pub prompts: Mutex<Vec<String>>,
    fail: bool,
}

impl StubModel {
    pub fn answering() -> Arc<Self> {
        Arc::new(Self {
            prompts: Mutex::new(Vec::new()),
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            prompts: Mutex::new(Vec::new()),
            fail: true,
        })
    }
}

#[async_trait]
impl LanguageModel for StubModel {
    async fn generate(&self, _system: &str, prompt: &str) -> Result<String, OrchestrationError> {
        self.prompts.lock().await.push(prompt.to_string());
        if self.fail {
            return Err(OrchestrationError::LlmError("model unavailable".to_string()));
        }
        Ok("Diversify and keep costs low.".to_string())
    }
}

// =============================================================================
// Wiring
// =============================================================================

pub fn orchestrator(
    config: &OrchestratorConfig,
    tools: Vec<(ToolSpec, Arc<StubTool>)>,
    model: Arc<StubModel>,
) -> Orchestrator {
    let mut registry = ToolRegistry::new();
    for (spec, tool) in tools {
        registry.register(spec, tool);
    }
    Orchestrator::with_retry_policy(config, registry, model, RetryPolicy::immediate())
}
