//! Usage analytics
//!
//! Process-lifetime counters over answered questions. Off the hot path: the
//! orchestrator records once per request after the answer is settled.

use crate::models::QueryCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct UsageStats {
    total_queries: u64,
    successful_queries: u64,
    failed_queries: u64,
    tool_usage: BTreeMap<String, u64>,
    query_categories: BTreeMap<String, u64>,
    total_response_ms: u64,
    last_query_at: Option<DateTime<Utc>>,
}

/// Point-in-time view served by the analytics endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsageSnapshot {
    pub total_queries: u64,
    pub successful_queries: u64,
    pub failed_queries: u64,
    pub average_response_time_ms: f64,
    /// Tools that contributed context, by number of answers
    pub most_used_tools: BTreeMap<String, u64>,
    pub query_categories: BTreeMap<String, u64>,
    pub last_query_at: Option<DateTime<Utc>>,
}

/// Shared usage counters
#[derive(Clone)]
pub struct UsageAnalytics {
    stats: Arc<RwLock<UsageStats>>,
}

impl UsageAnalytics {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(RwLock::new(UsageStats::default())),
        }
    }

    /// Record an answered question.
    pub async fn record_success(&self, category: QueryCategory, tools_used: &[String], elapsed_ms: u64) {
        let mut stats = self.stats.write().await;
        stats.total_queries += 1;
        stats.successful_queries += 1;
        stats.total_response_ms += elapsed_ms;
        *stats.query_categories.entry(category.to_string()).or_insert(0) += 1;
        for tool in tools_used {
            *stats.tool_usage.entry(tool.clone()).or_insert(0) += 1;
        }
        stats.last_query_at = Some(Utc::now());
    }

    /// Record a question that ended without an answer.
    pub async fn record_failure(&self, category: QueryCategory) {
        let mut stats = self.stats.write().await;
        stats.total_queries += 1;
        stats.failed_queries += 1;
        *stats.query_categories.entry(category.to_string()).or_insert(0) += 1;
        stats.last_query_at = Some(Utc::now());
    }

    pub async fn snapshot(&self) -> UsageSnapshot {
        let stats = self.stats.read().await;

        let average_response_time_ms = if stats.successful_queries == 0 {
            0.0
        } else {
            stats.total_response_ms as f64 / stats.successful_queries as f64
        };

        UsageSnapshot {
            total_queries: stats.total_queries,
            successful_queries: stats.successful_queries,
            failed_queries: stats.failed_queries,
            average_response_time_ms,
            most_used_tools: stats.tool_usage.clone(),
            query_categories: stats.query_categories.clone(),
            last_query_at: stats.last_query_at,
        }
    }
}

impl Default for UsageAnalytics {
    fn default() -> Self {
        Self::new()
    }
}
