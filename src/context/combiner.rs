//! Response Combiner
//!
//! Dedup, rank, truncate, then score. Runs synchronously on the records the
//! normalizer produced for one request.

use crate::config::{ConfidenceWeights, OrchestratorConfig};
use crate::models::{ContextBundle, ContextRecord};
use std::cmp::Ordering;
use std::collections::HashMap;

pub struct ResponseCombiner {
    max_records: usize,
    weights: ConfidenceWeights,
}

impl ResponseCombiner {
    pub fn new(max_records: usize, weights: ConfidenceWeights) -> Self {
        Self {
            max_records,
            weights,
        }
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(config.max_context_records, config.confidence)
    }

    /// Build the bundle. `invoked_tools` are the ids the fan-out actually
    /// called, in invocation order; records are expected in that order too.
    pub fn combine(&self, records: Vec<ContextRecord>, invoked_tools: &[String]) -> ContextBundle {
        let mut retained = dedupe(records);

        // Stable: equal scores keep insertion order.
        retained.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(Ordering::Equal)
        });
        retained.truncate(self.max_records);

        let tools_used = tools_used(&retained, invoked_tools);
        let overall_confidence = self.confidence(&retained, invoked_tools);

        ContextBundle {
            records: retained,
            tools_used,
            overall_confidence,
        }
    }

    /// Weighted mean of the tool success fraction and the per-tool mean
    /// relevance, both taken over the invoked tools.
    fn confidence(&self, retained: &[ContextRecord], invoked_tools: &[String]) -> f64 {
        if retained.is_empty() {
            return 0.0;
        }

        let mut per_tool: HashMap<&str, (f64, usize)> = HashMap::new();
        for record in retained {
            let entry = per_tool.entry(record.source_tool.as_str()).or_insert((0.0, 0));
            entry.0 += record.relevance_score;
            entry.1 += 1;
        }

        let invoked = invoked_tools.len().max(per_tool.len());
        let success = per_tool.len() as f64 / invoked as f64;
        let quality = per_tool
            .values()
            .map(|(sum, count)| sum / *count as f64)
            .sum::<f64>()
            / invoked as f64;

        let ConfidenceWeights { success: ws, relevance: wr } = self.weights;
        let total = ws + wr;
        if total <= 0.0 || !total.is_finite() {
            return 0.0;
        }

        let score = (ws * success + wr * quality) / total;
        if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Collapse records that share (source_tool, reference) or normalized body.
/// A record can match several kept records at once; the whole group
/// collapses into its highest-scoring member, placed where the first match
/// was. On a tie the earlier record stays.
fn dedupe(records: Vec<ContextRecord>) -> Vec<ContextRecord> {
    let mut kept: Vec<(ContextRecord, String)> = Vec::with_capacity(records.len());

    for record in records {
        let body_key = normalize_body(&record.body_text);
        let matches: Vec<usize> = kept
            .iter()
            .enumerate()
            .filter(|(_, (existing, existing_body))| {
                let same_reference = !record.url_or_reference.is_empty()
                    && existing.source_tool == record.source_tool
                    && existing.url_or_reference == record.url_or_reference;
                let same_body = !body_key.is_empty() && *existing_body == body_key;
                same_reference || same_body
            })
            .map(|(idx, _)| idx)
            .collect();

        let Some(&first) = matches.first() else {
            kept.push((record, body_key));
            continue;
        };

        // Strictly greater, so earlier records win ties.
        let best = matches.iter().copied().fold(first, |best, idx| {
            if kept[idx].0.relevance_score > kept[best].0.relevance_score {
                idx
            } else {
                best
            }
        });
        let winner = if record.relevance_score > kept[best].0.relevance_score {
            (record, body_key)
        } else {
            kept[best].clone()
        };

        kept[first] = winner;
        for &idx in matches[1..].iter().rev() {
            kept.remove(idx);
        }
    }

    kept.into_iter().map(|(record, _)| record).collect()
}

fn normalize_body(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Contributing tools in invocation order; unknown sources go last.
fn tools_used(retained: &[ContextRecord], invoked_tools: &[String]) -> Vec<String> {
    let mut used: Vec<String> = invoked_tools
        .iter()
        .filter(|id| retained.iter().any(|r| &r.source_tool == *id))
        .cloned()
        .collect();

    for record in retained {
        if !used.contains(&record.source_tool) {
            used.push(record.source_tool.clone());
        }
    }

    used
}
