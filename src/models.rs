//! Core data models for the wealth advisor orchestrator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

//
// ================= Enums =================
//

/// Capability tag used to route a question to adapters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    Web,
    Academic,
    MarketData,
    Document,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::Web,
        Capability::Academic,
        Capability::MarketData,
        Capability::Document,
    ];
}

/// Which parsing rule applies to an adapter's raw payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    WebSearch,
    Academic,
    MarketData,
    Document,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InvocationStatus {
    Pending,
    Success,
    Timeout,
    Error,
}

/// What kind of adapter failure ended an invocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Transient,
    /// The adapter refused the question; says nothing about the tool's health
    Validation,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QueryCategory {
    InvestmentAdvice,
    RetirementPlanning,
    TaxPlanning,
    RiskManagement,
    MarketAnalysis,
    GeneralAdvice,
}

//
// ================= Question =================
//

/// Immutable user question with a request-scoped correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    id: Uuid,
    text: Arc<str>,
    received_at: DateTime<Utc>,
}

impl Question {
    pub fn new(text: impl Into<String>) -> Self {
        let text: String = text.into();
        Self {
            id: Uuid::new_v4(),
            text: Arc::from(text),
            received_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

//
// ================= Tools =================
//

/// Static descriptor of one adapter, built from configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    pub id: String,
    pub capabilities: Vec<Capability>,
    pub enabled: bool,
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    pub max_retries: u32,
}

impl ToolSpec {
    pub fn serves_any(&self, tags: &std::collections::BTreeSet<Capability>) -> bool {
        self.capabilities.iter().any(|c| tags.contains(c))
    }
}

/// Adapter output before normalization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "format", content = "body", rename_all = "lowercase")]
pub enum RawPayload {
    Json(serde_json::Value),
    Text(String),
}

/// One adapter call for one request, owned by the fan-out executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub invocation_id: Uuid,
    pub tool_id: String,
    pub source: SourceKind,
    pub status: InvocationStatus,
    pub raw_payload: Option<RawPayload>,
    pub error: Option<String>,
    pub failure_kind: Option<FailureKind>,
    pub latency_ms: u64,
    pub attempt_count: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ToolInvocation {
    pub fn pending(tool_id: &str, source: SourceKind) -> Self {
        Self {
            invocation_id: Uuid::new_v4(),
            tool_id: tool_id.to_string(),
            source,
            status: InvocationStatus::Pending,
            raw_payload: None,
            error: None,
            failure_kind: None,
            latency_ms: 0,
            attempt_count: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.status != InvocationStatus::Pending
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, InvocationStatus::Timeout | InvocationStatus::Error)
    }

    /// Failures that point at the tool itself rather than at the question.
    pub fn is_health_failure(&self) -> bool {
        self.is_failure() && self.failure_kind != Some(FailureKind::Validation)
    }
}

/// Health view of one registered tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolStatus {
    pub id: String,
    pub description: String,
    pub capabilities: Vec<Capability>,
    pub enabled: bool,
    pub cooldown_remaining_ms: Option<u64>,
}

//
// ================= Context =================
//

/// Normalized unit of evidence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextRecord {
    pub source_tool: String,
    pub title: String,
    pub body_text: String,
    pub url_or_reference: String,
    pub relevance_score: f64,
    pub timestamp: DateTime<Utc>,
}

/// Ranked, deduplicated evidence handed to synthesis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextBundle {
    pub records: Vec<ContextRecord>,
    pub tools_used: Vec<String>,
    pub overall_confidence: f64,
}

impl ContextBundle {
    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
            tools_used: Vec::new(),
            overall_confidence: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

//
// ================= Final Result =================
//

/// Output of the synthesis gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Synthesis {
    pub answer_text: String,
    pub tools_used: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub correlation_id: Uuid,
    pub question: String,
    pub answer: String,
    pub tools_used: Vec<String>,
    pub confidence: f64,
    pub category: QueryCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextBundle>,
    pub processing_time_ms: u64,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Capability::Web => "web",
            Capability::Academic => "academic",
            Capability::MarketData => "market-data",
            Capability::Document => "document",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for QueryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueryCategory::InvestmentAdvice => "investment_advice",
            QueryCategory::RetirementPlanning => "retirement_planning",
            QueryCategory::TaxPlanning => "tax_planning",
            QueryCategory::RiskManagement => "risk_management",
            QueryCategory::MarketAnalysis => "market_analysis",
            QueryCategory::GeneralAdvice => "general_advice",
        };
        write!(f, "{}", s)
    }
}

/// Serde helper: durations as integer milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
