//! Tool registry
//!
//! Holds the configured adapters and their live availability. A request reads
//! the enabled set once via `resolve`; the returned `ResolvedTool`s are owned
//! snapshots, so later `mark_*` calls never reach a request already in flight.

use super::ToolAdapter;
use crate::config::MAX_COOLDOWN;
use crate::error::OrchestrationError;
use crate::models::{Capability, ToolSpec, ToolStatus};
use crate::Result;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{info, warn};

/// Deadline `cooldown` from now, capped at `MAX_COOLDOWN`.
pub fn cooldown_deadline(cooldown: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(cooldown.min(MAX_COOLDOWN))
        .or_else(|| now.checked_add(MAX_COOLDOWN))
        .unwrap_or(now)
}

struct RegistryEntry {
    /// `spec.enabled` is the configured switch; cooldowns never touch it
    spec: ToolSpec,
    adapter: Arc<dyn ToolAdapter>,
    /// Set by `mark_unavailable`
    unavailable_until: Option<Instant>,
}

impl RegistryEntry {
    /// An enabled tool whose cooldown has elapsed is available again (half-open).
    fn is_available(&self, now: Instant) -> bool {
        self.spec.enabled && self.unavailable_until.map_or(true, |until| now >= until)
    }

    fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        self.unavailable_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }
}

/// Adapter plus the `ToolSpec` snapshot taken at resolve time
#[derive(Clone)]
pub struct ResolvedTool {
    pub spec: ToolSpec,
    pub adapter: Arc<dyn ToolAdapter>,
}

impl fmt::Debug for ResolvedTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedTool")
            .field("spec", &self.spec)
            .field("source", &self.adapter.source_kind())
            .finish()
    }
}

/// Tool registry for routing and health state
pub struct ToolRegistry {
    entries: RwLock<Vec<RegistryEntry>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Register (or replace) a tool. Registration order is routing order.
    pub fn register(&mut self, spec: ToolSpec, adapter: Arc<dyn ToolAdapter>) {
        let entries = self.entries.get_mut();
        let entry = RegistryEntry {
            spec,
            adapter,
            unavailable_until: None,
        };

        match entries.iter_mut().find(|e| e.spec.id == entry.spec.id) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
    }

    /// Available tools serving any of `tags`, in registration order.
    pub async fn resolve(&self, tags: &BTreeSet<Capability>) -> Vec<ResolvedTool> {
        let now = Instant::now();
        let entries = self.entries.read().await;

        entries
            .iter()
            .filter(|e| e.is_available(now) && e.spec.serves_any(tags))
            .map(|e| ResolvedTool {
                spec: ToolSpec {
                    enabled: true,
                    ..e.spec.clone()
                },
                adapter: Arc::clone(&e.adapter),
            })
            .collect()
    }

    /// Take a tool out of routing until `until`. Only an enabled tool becomes
    /// resolvable again afterwards.
    pub async fn mark_unavailable(&self, tool_id: &str, until: Instant) -> Result<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .iter_mut()
            .find(|e| e.spec.id == tool_id)
            .ok_or_else(|| OrchestrationError::ToolNotFound(tool_id.to_string()))?;

        entry.unavailable_until = Some(until);

        warn!(
            tool_id = %tool_id,
            cooldown_ms = until.saturating_duration_since(Instant::now()).as_millis() as u64,
            "Tool marked unavailable"
        );
        Ok(())
    }

    /// Enable a tool and clear any cooldown.
    pub async fn mark_available(&self, tool_id: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .iter_mut()
            .find(|e| e.spec.id == tool_id)
            .ok_or_else(|| OrchestrationError::ToolNotFound(tool_id.to_string()))?;

        entry.spec.enabled = true;
        entry.unavailable_until = None;

        info!(tool_id = %tool_id, "Tool marked available");
        Ok(())
    }

    /// Current enabled/disabled state of every tool, for monitoring.
    pub async fn status(&self) -> Vec<ToolStatus> {
        let now = Instant::now();
        let entries = self.entries.read().await;

        entries
            .iter()
            .map(|e| ToolStatus {
                id: e.spec.id.clone(),
                description: e.adapter.description().to_string(),
                capabilities: e.spec.capabilities.clone(),
                enabled: e.is_available(now),
                cooldown_remaining_ms: e
                    .cooldown_remaining(now)
                    .map(|d| d.as_millis() as u64),
            })
            .collect()
    }

    pub async fn contains(&self, tool_id: &str) -> bool {
        self.entries.read().await.iter().any(|e| e.spec.id == tool_id)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
