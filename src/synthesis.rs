//! Synthesis Gateway
//!
//! Hands the question and the combined context to a language model. The
//! model only writes the answer text; `tools_used` and `confidence` come from
//! the bundle unchanged.

use crate::error::OrchestrationError;
use crate::models::{ContextBundle, Question, Synthesis};
use crate::Result;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Opaque text-generation backend
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String>;
}

pub const NO_CONTEXT_NOTICE: &str = "No external context was retrieved for this question. \
Answer from general financial knowledge and say that no sources were consulted.";

const SYSTEM_PROMPT: &str = r#"You are a professional financial advisor and analyst.

Guidelines:
- Provide accurate and educational financial information
- Ground your answer in the numbered context records when they are relevant
- Cite records as [n] and never invent sources
- Emphasize risk awareness and note when information may be out of date
- Be structured and concise

Format: Provide structured answers suitable for financial decision-making."#;

pub struct SynthesisGateway {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl SynthesisGateway {
    pub fn new(model: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    /// One model call under the gateway timeout. Any failure is fatal to the request.
    pub async fn synthesize(&self, question: &Question, bundle: &ContextBundle) -> Result<Synthesis> {
        let prompt = build_prompt(question, bundle);
        let start = Instant::now();

        info!(
            correlation_id = %question.id(),
            records = bundle.records.len(),
            "Calling synthesis model"
        );

        let answer = match tokio::time::timeout(self.timeout, self.model.generate(SYSTEM_PROMPT, &prompt)).await {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                error!(correlation_id = %question.id(), error = %e, "Synthesis failed");
                return Err(OrchestrationError::SynthesisFailure(e.to_string()));
            }
            Err(_) => {
                error!(
                    correlation_id = %question.id(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Synthesis timed out"
                );
                return Err(OrchestrationError::SynthesisFailure(format!(
                    "model call timed out after {:?}",
                    self.timeout
                )));
            }
        };

        info!(
            correlation_id = %question.id(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Synthesis completed"
        );

        Ok(Synthesis {
            answer_text: answer,
            tools_used: bundle.tools_used.clone(),
            confidence: bundle.overall_confidence,
        })
    }
}

/// Question followed by numbered context records, or the no-context notice.
pub fn build_prompt(question: &Question, bundle: &ContextBundle) -> String {
    let mut prompt = format!("Question: {}\n\n", question.text().trim());

    if bundle.is_empty() {
        prompt.push_str(NO_CONTEXT_NOTICE);
        return prompt;
    }

    prompt.push_str("Context:\n");
    for (i, record) in bundle.records.iter().enumerate() {
        let _ = writeln!(prompt, "[{}] {} (source: {})", i + 1, record.title, record.source_tool);
        if !record.url_or_reference.is_empty() {
            let _ = writeln!(prompt, "Reference: {}", record.url_or_reference);
        }
        let _ = writeln!(prompt, "{}\n", record.body_text);
    }
    prompt.push_str("Answer the question using the context above where relevant.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContextRecord;
    use chrono::Utc;
    use tokio::sync::Mutex;

    struct RecordingModel {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl LanguageModel for RecordingModel {
        async fn generate(&self, _system: &str, prompt: &str) -> Result<String> {
            self.prompts.lock().await.push(prompt.to_string());
            Ok("answer".to_string())
        }
    }

    struct FailingModel;

    #[async_trait::async_trait]
    impl LanguageModel for FailingModel {
        async fn generate(&self, _system: &str, _prompt: &str) -> Result<String> {
            Err(OrchestrationError::LlmError("quota exceeded".to_string()))
        }
    }

    struct StalledModel;

    #[async_trait::async_trait]
    impl LanguageModel for StalledModel {
        async fn generate(&self, _system: &str, _prompt: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("too late".to_string())
        }
    }

    fn bundle() -> ContextBundle {
        ContextBundle {
            records: vec![ContextRecord {
                source_tool: "tavily_search".to_string(),
                title: "Fed holds rates".to_string(),
                body_text: "The committee left rates unchanged.".to_string(),
                url_or_reference: "https://news.example/fed".to_string(),
                relevance_score: 0.9,
                timestamp: Utc::now(),
            }],
            tools_used: vec!["tavily_search".to_string()],
            overall_confidence: 0.45,
        }
    }

    #[tokio::test]
    async fn test_passes_bundle_metadata_through() {
        let model = Arc::new(RecordingModel {
            prompts: Mutex::new(Vec::new()),
        });
        let gateway = SynthesisGateway::new(model.clone(), Duration::from_secs(1));

        let synthesis = gateway.synthesize(&Question::new("Will rates fall?"), &bundle()).await.unwrap();

        assert_eq!(synthesis.answer_text, "answer");
        assert_eq!(synthesis.tools_used, vec!["tavily_search".to_string()]);
        assert_eq!(synthesis.confidence, 0.45);

        let prompts = model.prompts.lock().await;
        assert!(prompts[0].contains("[1] Fed holds rates"));
        assert!(prompts[0].contains("https://news.example/fed"));
    }

    #[tokio::test]
    async fn test_empty_bundle_still_calls_model() {
        let model = Arc::new(RecordingModel {
            prompts: Mutex::new(Vec::new()),
        });
        let gateway = SynthesisGateway::new(model.clone(), Duration::from_secs(1));

        let synthesis = gateway
            .synthesize(&Question::new("What is a Roth IRA?"), &ContextBundle::empty())
            .await
            .unwrap();

        assert!(synthesis.tools_used.is_empty());
        assert_eq!(synthesis.confidence, 0.0);
        assert!(model.prompts.lock().await[0].contains(NO_CONTEXT_NOTICE));
    }

    #[tokio::test]
    async fn test_model_error_is_synthesis_failure() {
        let gateway = SynthesisGateway::new(Arc::new(FailingModel), Duration::from_secs(1));
        let result = gateway.synthesize(&Question::new("q"), &bundle()).await;
        assert!(matches!(result, Err(OrchestrationError::SynthesisFailure(_))));
    }

    #[tokio::test]
    async fn test_timeout_is_synthesis_failure() {
        let gateway = SynthesisGateway::new(Arc::new(StalledModel), Duration::from_millis(20));
        let result = gateway.synthesize(&Question::new("q"), &bundle()).await;
        assert!(matches!(result, Err(OrchestrationError::SynthesisFailure(_))));
    }
}
