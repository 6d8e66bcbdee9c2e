//! Fan-out execution engine
//!
//! Runs every resolved tool for one question concurrently, each under its own
//! timeout and retry budget, and joins on all of them. Adapter failures end up
//! as invocation status; nothing here returns an error.

pub mod retry;

pub use retry::RetryPolicy;

use crate::error::AdapterError;
use crate::models::{FailureKind, InvocationStatus, Question, ToolInvocation};
use crate::tools::ResolvedTool;
use chrono::Utc;
use std::time::Instant;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Aborts every spawned adapter task when the fan-out is dropped or cancelled
struct AbortOnDrop(Vec<JoinHandle<ToolInvocation>>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Executes tool invocations concurrently with bulkhead isolation
#[derive(Debug, Clone, Default)]
pub struct FanOutExecutor {
    retry: RetryPolicy,
}

impl FanOutExecutor {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// Invoke every tool and wait for all of them to settle.
    /// Returns exactly one invocation per tool, in the order given.
    pub async fn execute(&self, tools: &[ResolvedTool], question: &Question) -> Vec<ToolInvocation> {
        self.execute_with_cancel(tools, question, &CancellationToken::new())
            .await
    }

    /// Like `execute`, but stops waiting once `cancel` fires. Invocations that
    /// had not settled by then are aborted and stay `Pending`.
    pub async fn execute_with_cancel(
        &self,
        tools: &[ResolvedTool],
        question: &Question,
        cancel: &CancellationToken,
    ) -> Vec<ToolInvocation> {
        let mut invocations: Vec<ToolInvocation> = tools
            .iter()
            .map(|tool| ToolInvocation::pending(&tool.spec.id, tool.adapter.source_kind()))
            .collect();

        info!(
            correlation_id = %question.id(),
            tool_count = tools.len(),
            "Starting fan-out"
        );

        let mut tasks = AbortOnDrop(Vec::with_capacity(tools.len()));
        for (tool, invocation) in tools.iter().zip(&invocations) {
            tasks.0.push(tokio::spawn(run_tool(
                tool.clone(),
                question.clone(),
                self.retry,
                invocation.clone(),
            )));
        }

        let mut joined = 0;
        for (slot, handle) in invocations.iter_mut().zip(tasks.0.iter_mut()) {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = handle => settle(slot, result),
            }
            joined += 1;
        }

        if joined < tasks.0.len() {
            // Keep whatever finished before the cancellation was observed.
            for (slot, handle) in invocations.iter_mut().zip(tasks.0.iter_mut()).skip(joined) {
                if handle.is_finished() {
                    settle(slot, handle.await);
                } else {
                    handle.abort();
                }
            }

            warn!(
                correlation_id = %question.id(),
                pending = invocations.iter().filter(|i| !i.is_settled()).count(),
                "Fan-out cancelled"
            );
        }

        debug!(
            correlation_id = %question.id(),
            succeeded = invocations
                .iter()
                .filter(|i| i.status == InvocationStatus::Success)
                .count(),
            failed = invocations.iter().filter(|i| i.is_failure()).count(),
            "Fan-out completed"
        );

        invocations
    }
}

fn settle(slot: &mut ToolInvocation, result: Result<ToolInvocation, JoinError>) {
    match result {
        Ok(invocation) => *slot = invocation,
        Err(e) if e.is_cancelled() => {}
        Err(e) => {
            warn!(tool_id = %slot.tool_id, error = %e, "Adapter task panicked");
            slot.status = InvocationStatus::Error;
            slot.error = Some(format!("adapter task failed: {}", e));
            slot.failure_kind = Some(FailureKind::Transient);
            slot.finished_at = Some(Utc::now());
        }
    }
}

/// One tool's attempt loop. The final status is the last attempt's outcome.
async fn run_tool(
    tool: ResolvedTool,
    question: Question,
    retry: RetryPolicy,
    mut invocation: ToolInvocation,
) -> ToolInvocation {
    let spec = &tool.spec;
    let start = Instant::now();

    loop {
        invocation.attempt_count += 1;
        let attempt = invocation.attempt_count;

        let outcome = match tokio::time::timeout(spec.timeout, tool.adapter.invoke(&question, spec.timeout)).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::Timeout(spec.timeout)),
        };

        match outcome {
            Ok(payload) => {
                invocation.status = InvocationStatus::Success;
                invocation.raw_payload = Some(payload);
                invocation.error = None;
                invocation.failure_kind = None;
                debug!(
                    correlation_id = %question.id(),
                    tool_id = %spec.id,
                    attempt,
                    "Tool call succeeded"
                );
                break;
            }
            Err(err) => {
                invocation.status = match err {
                    AdapterError::Timeout(_) => InvocationStatus::Timeout,
                    _ => InvocationStatus::Error,
                };
                invocation.error = Some(err.to_string());
                invocation.failure_kind = Some(err.kind());

                if !err.is_retryable() || attempt > spec.max_retries {
                    warn!(
                        correlation_id = %question.id(),
                        tool_id = %spec.id,
                        attempt,
                        error = %err,
                        "Tool call failed"
                    );
                    break;
                }

                let delay = retry.delay_for(attempt);
                debug!(
                    correlation_id = %question.id(),
                    tool_id = %spec.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying tool call"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    invocation.latency_ms = start.elapsed().as_millis() as u64;
    invocation.finished_at = Some(Utc::now());
    invocation
}
