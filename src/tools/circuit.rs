//! Consecutive-failure circuit breaker
//!
//! Counts timeouts and errors per tool across requests. When a tool reaches
//! the threshold it is taken out of routing for the configured cooldown;
//! the registry lets it back in once the cooldown has elapsed. Validation
//! rejections neither count nor reset the streak.

use super::{cooldown_deadline, ToolRegistry};
use crate::config::CircuitBreakerConfig;
use crate::models::{InvocationStatus, ToolInvocation};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{error, warn};

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    failures: Mutex<HashMap<String, u32>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Record the outcome of one fan-out and trip tools past the threshold.
    /// Returns the ids that were marked unavailable.
    pub async fn observe(&self, registry: &ToolRegistry, invocations: &[ToolInvocation]) -> Vec<String> {
        let tripped: Vec<String> = {
            let mut failures = self.failures.lock().await;
            let mut tripped = Vec::new();

            for inv in invocations {
                match inv.status {
                    InvocationStatus::Success => {
                        failures.remove(&inv.tool_id);
                    }
                    _ if inv.is_health_failure() => {
                        let count = failures.entry(inv.tool_id.clone()).or_insert(0);
                        *count += 1;
                        if *count >= self.config.failure_threshold {
                            failures.remove(&inv.tool_id);
                            tripped.push(inv.tool_id.clone());
                        }
                    }
                    _ => {}
                }
            }

            tripped
        };

        let until = cooldown_deadline(self.config.cooldown);
        for tool_id in &tripped {
            warn!(
                tool_id = %tool_id,
                threshold = self.config.failure_threshold,
                "Circuit opened after consecutive failures"
            );
            if let Err(e) = registry.mark_unavailable(tool_id, until).await {
                error!(tool_id = %tool_id, error = %e, "Failed to open circuit");
            }
        }

        tripped
    }

    pub async fn failure_count(&self, tool_id: &str) -> u32 {
        self.failures.lock().await.get(tool_id).copied().unwrap_or(0)
    }
}
