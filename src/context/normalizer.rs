//! Context Normalizer
//!
//! Turns each successful invocation's raw payload into `ContextRecord`s using
//! the parsing rule of its source kind. Parsing is best-effort per item: a
//! missing field becomes an empty string, a payload that cannot be read at
//! all yields no records.

use crate::models::{ContextRecord, InvocationStatus, RawPayload, SourceKind, ToolInvocation};
use chrono::{DateTime, NaiveDate, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

/// Upper bound on a record's body, in characters
pub const MAX_BODY_CHARS: usize = 2_000;

lazy_static! {
    static ref ATOM_ENTRY: Regex = Regex::new(r"(?s)<entry[^>]*>(.*?)</entry>").unwrap();
    static ref ATOM_TITLE: Regex = Regex::new(r"(?s)<title[^>]*>(.*?)</title>").unwrap();
    static ref ATOM_SUMMARY: Regex = Regex::new(r"(?s)<summary[^>]*>(.*?)</summary>").unwrap();
    static ref ATOM_ID: Regex = Regex::new(r"(?s)<id[^>]*>(.*?)</id>").unwrap();
    static ref ATOM_PUBLISHED: Regex =
        Regex::new(r"(?s)<published[^>]*>(.*?)</published>").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Stateless payload-to-record converter
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextNormalizer;

impl ContextNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Records for one invocation, or `None` when it produced no readable evidence.
    pub fn normalize(&self, invocation: &ToolInvocation) -> Option<Vec<ContextRecord>> {
        if invocation.status != InvocationStatus::Success {
            return None;
        }
        let payload = invocation.raw_payload.as_ref()?;
        let fallback = invocation.finished_at.unwrap_or_else(Utc::now);
        let tool = invocation.tool_id.as_str();

        let records = match (invocation.source, payload) {
            (SourceKind::WebSearch, RawPayload::Json(value)) => parse_web(tool, value, fallback),
            (SourceKind::Academic, RawPayload::Text(text)) => parse_atom(tool, text, fallback)?,
            (SourceKind::MarketData, RawPayload::Json(value)) => parse_quotes(tool, value, fallback),
            (SourceKind::Document, RawPayload::Json(value)) => parse_chunks(tool, value, fallback),
            (source, _) => {
                warn!(
                    tool_id = %tool,
                    source = ?source,
                    "Payload format does not match source kind"
                );
                return None;
            }
        };

        debug!(tool_id = %tool, records = records.len(), "Normalized payload");
        Some(records)
    }

    /// All records from all invocations, in invocation order.
    pub fn normalize_all(&self, invocations: &[ToolInvocation]) -> Vec<ContextRecord> {
        invocations
            .iter()
            .filter_map(|inv| self.normalize(inv))
            .flatten()
            .collect()
    }
}

//
// ================= Per-source rules =================
//

fn parse_web(tool: &str, value: &Value, fallback: DateTime<Utc>) -> Vec<ContextRecord> {
    let Some(results) = value.get("results").and_then(Value::as_array) else {
        return Vec::new();
    };

    results
        .iter()
        .enumerate()
        .filter(|(_, item)| item.is_object())
        .map(|(i, item)| ContextRecord {
            source_tool: tool.to_string(),
            title: str_field(item, "title"),
            body_text: truncate_chars(&str_field(item, "content"), MAX_BODY_CHARS),
            url_or_reference: str_field(item, "url"),
            relevance_score: score_or_position(item.get("score"), i),
            timestamp: item
                .get("published_date")
                .and_then(Value::as_str)
                .and_then(parse_timestamp)
                .unwrap_or(fallback),
        })
        .collect()
}

/// `None` when the text is not an Atom feed at all.
fn parse_atom(tool: &str, text: &str, fallback: DateTime<Utc>) -> Option<Vec<ContextRecord>> {
    if !text.contains("<feed") {
        return None;
    }

    let records = ATOM_ENTRY
        .captures_iter(text)
        .enumerate()
        .map(|(i, entry)| {
            let entry = &entry[1];
            ContextRecord {
                source_tool: tool.to_string(),
                title: atom_field(&ATOM_TITLE, entry),
                body_text: truncate_chars(&atom_field(&ATOM_SUMMARY, entry), MAX_BODY_CHARS),
                url_or_reference: atom_field(&ATOM_ID, entry),
                relevance_score: positional_relevance(i),
                timestamp: parse_timestamp(&atom_field(&ATOM_PUBLISHED, entry)).unwrap_or(fallback),
            }
        })
        .collect();

    Some(records)
}

fn parse_quotes(tool: &str, value: &Value, fallback: DateTime<Utc>) -> Vec<ContextRecord> {
    let Some(quotes) = value
        .pointer("/quoteResponse/result")
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    quotes
        .iter()
        .filter(|quote| quote.is_object())
        .map(|quote| {
            let symbol = quote
                .get("symbol")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim();
            let name = quote
                .get("longName")
                .or_else(|| quote.get("shortName"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            let title = match (symbol.is_empty(), name.is_empty()) {
                (false, false) => format!("{} ({})", symbol, name),
                (false, true) => symbol.to_string(),
                _ => name.to_string(),
            };
            let reference = if symbol.is_empty() {
                String::new()
            } else {
                format!("https://finance.yahoo.com/quote/{}", symbol)
            };

            let has_price = quote
                .get("regularMarketPrice")
                .and_then(Value::as_f64)
                .is_some();

            ContextRecord {
                source_tool: tool.to_string(),
                title,
                body_text: truncate_chars(&quote_summary(symbol, quote), MAX_BODY_CHARS),
                url_or_reference: reference,
                relevance_score: if has_price { 1.0 } else { 0.5 },
                timestamp: quote
                    .get("regularMarketTime")
                    .and_then(Value::as_i64)
                    .and_then(|secs| DateTime::from_timestamp(secs, 0))
                    .unwrap_or(fallback),
            }
        })
        .collect()
}

/// Quote fields as "Label: value" lines; absent fields are omitted.
fn quote_summary(symbol: &str, quote: &Value) -> String {
    const FIELDS: &[(&str, &str, &str)] = &[
        ("Price", "regularMarketPrice", "$"),
        ("Previous Close", "regularMarketPreviousClose", "$"),
        ("Change", "regularMarketChange", ""),
        ("Change %", "regularMarketChangePercent", ""),
        ("Volume", "regularMarketVolume", ""),
        ("Market Cap", "marketCap", "$"),
        ("P/E Ratio", "trailingPE", ""),
        ("Dividend Yield", "dividendYield", ""),
        ("52 Week High", "fiftyTwoWeekHigh", "$"),
        ("52 Week Low", "fiftyTwoWeekLow", "$"),
    ];

    let mut lines = Vec::new();
    if !symbol.is_empty() {
        lines.push(format!("Stock: {}", symbol));
    }
    for (label, key, prefix) in FIELDS {
        if let Some(value) = quote.get(*key).filter(|v| v.is_number()) {
            lines.push(format!("{}: {}{}", label, prefix, value));
        }
    }
    lines.join("\n")
}

fn parse_chunks(tool: &str, value: &Value, fallback: DateTime<Utc>) -> Vec<ContextRecord> {
    let Some(chunks) = value.get("chunks").and_then(Value::as_array) else {
        return Vec::new();
    };

    chunks
        .iter()
        .enumerate()
        .filter(|(_, chunk)| chunk.is_object())
        .map(|(i, chunk)| {
            let source = str_field(chunk, "source");
            let page = chunk.get("page").and_then(Value::as_u64);

            let (title, reference) = match page {
                Some(page) => (
                    format!("{} (page {})", display_source(&source), page),
                    format!("{}#page={}", source, page),
                ),
                None => (display_source(&source).to_string(), source.clone()),
            };

            ContextRecord {
                source_tool: tool.to_string(),
                title,
                body_text: truncate_chars(&str_field(chunk, "text"), MAX_BODY_CHARS),
                url_or_reference: reference,
                relevance_score: score_or_position(chunk.get("score"), i),
                timestamp: fallback,
            }
        })
        .collect()
}

//
// ================= Helpers =================
//

/// Relevance for sources that only give a rank: 0.8, 0.7, ... floored at 0.2.
pub fn positional_relevance(index: usize) -> f64 {
    (0.8 - 0.1 * index as f64).max(0.2)
}

fn score_or_position(score: Option<&Value>, index: usize) -> f64 {
    score
        .and_then(Value::as_f64)
        .filter(|s| s.is_finite())
        .map(|s| s.clamp(0.0, 1.0))
        .unwrap_or_else(|| positional_relevance(index))
}

fn str_field(item: &Value, key: &str) -> String {
    item.get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn display_source(source: &str) -> &str {
    if source.is_empty() {
        "Knowledge base"
    } else {
        source
    }
}

fn atom_field(pattern: &Regex, entry: &str) -> String {
    pattern
        .captures(entry)
        .map(|c| collapse_whitespace(&unescape_xml(&c[1])))
        .unwrap_or_default()
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// RFC 3339, RFC 2822 or a bare date.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        })
}

/// Cut to at most `max` characters without splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn success(tool: &str, source: SourceKind, payload: RawPayload) -> ToolInvocation {
        let mut inv = ToolInvocation::pending(tool, source);
        inv.status = InvocationStatus::Success;
        inv.raw_payload = Some(payload);
        inv.finished_at = Some(Utc::now());
        inv
    }

    #[test]
    fn test_non_success_yields_none() {
        let mut inv = success("web", SourceKind::WebSearch, RawPayload::Json(json!({"results": []})));
        inv.status = InvocationStatus::Timeout;
        assert!(ContextNormalizer.normalize(&inv).is_none());

        inv.status = InvocationStatus::Pending;
        assert!(ContextNormalizer.normalize(&inv).is_none());
    }

    #[test]
    fn test_web_results_best_effort() {
        let payload = json!({
            "results": [
                {"title": "Fed holds rates", "url": "https://news.example/fed", "content": "The Fed...", "score": 0.92, "published_date": "2024-05-01"},
                {"title": "No url or score", "content": "Body only"},
                "garbage",
                {"url": "https://news.example/x", "score": 7.5}
            ]
        });
        let inv = success("tavily_search", SourceKind::WebSearch, RawPayload::Json(payload));
        let records = ContextNormalizer.normalize(&inv).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].relevance_score, 0.92);
        assert_eq!(records[0].timestamp.date_naive().to_string(), "2024-05-01");
        assert_eq!(records[1].url_or_reference, "");
        assert!((records[1].relevance_score - 0.7).abs() < 1e-9);
        assert_eq!(records[2].title, "");
        assert_eq!(records[2].relevance_score, 1.0);
    }

    #[test]
    fn test_missing_result_array_is_empty_not_none() {
        let inv = success("tavily_search", SourceKind::WebSearch, RawPayload::Json(json!({"answer": null})));
        assert_eq!(ContextNormalizer.normalize(&inv), Some(vec![]));

        let inv = success("rag_query", SourceKind::Document, RawPayload::Json(Value::Null));
        assert_eq!(ContextNormalizer.normalize(&inv), Some(vec![]));
    }

    #[test]
    fn test_text_where_json_expected_is_none() {
        let inv = success(
            "yfinance_data",
            SourceKind::MarketData,
            RawPayload::Text("<html>rate limited</html>".to_string()),
        );
        assert!(ContextNormalizer.normalize(&inv).is_none());
    }

    #[test]
    fn test_atom_feed_entries() {
        let feed = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>arXiv Query</title>
  <entry>
    <id>http://arxiv.org/abs/2401.00001v1</id>
    <published>2024-01-02T18:00:00Z</published>
    <title>Momentum   Factors
      in Equity Markets</title>
    <summary>  We study momentum &amp; reversal.  </summary>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2401.00002v1</id>
    <title>Second paper</title>
  </entry>
</feed>"#;
        let inv = success("arxiv_search", SourceKind::Academic, RawPayload::Text(feed.to_string()));
        let records = ContextNormalizer.normalize(&inv).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "Momentum Factors in Equity Markets");
        assert_eq!(records[0].body_text, "We study momentum & reversal.");
        assert_eq!(records[0].url_or_reference, "http://arxiv.org/abs/2401.00001v1");
        assert_eq!(records[0].timestamp.to_rfc3339(), "2024-01-02T18:00:00+00:00");
        assert_eq!(records[1].body_text, "");
        assert!((records[1].relevance_score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_academic_non_feed_is_none() {
        let inv = success("arxiv_search", SourceKind::Academic, RawPayload::Text("Service Unavailable".to_string()));
        assert!(ContextNormalizer.normalize(&inv).is_none());

        let empty_feed = "<feed xmlns=\"http://www.w3.org/2005/Atom\"></feed>";
        let inv = success("arxiv_search", SourceKind::Academic, RawPayload::Text(empty_feed.to_string()));
        assert_eq!(ContextNormalizer.normalize(&inv), Some(vec![]));
    }

    #[test]
    fn test_market_quotes() {
        let payload = json!({
            "quoteResponse": {
                "result": [
                    {"symbol": "AAPL", "longName": "Apple Inc.", "regularMarketPrice": 189.5,
                     "regularMarketChangePercent": 1.25, "marketCap": 2950000000000u64,
                     "regularMarketTime": 1714579200},
                    {"symbol": "ZZZZ"},
                    {"longName": "No Symbol Corp", "regularMarketPrice": 12.0},
                    "garbage"
                ],
                "error": null
            }
        });
        let inv = success("yfinance_data", SourceKind::MarketData, RawPayload::Json(payload));
        let records = ContextNormalizer.normalize(&inv).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].title, "AAPL (Apple Inc.)");
        assert_eq!(records[0].url_or_reference, "https://finance.yahoo.com/quote/AAPL");
        assert_eq!(records[0].relevance_score, 1.0);
        assert!(records[0].body_text.contains("Price: $189.5"));
        assert!(records[0].body_text.contains("Change %: 1.25"));
        assert!(!records[0].body_text.contains("P/E Ratio"));
        assert_eq!(records[0].timestamp.timestamp(), 1714579200);

        assert_eq!(records[1].title, "ZZZZ");
        assert_eq!(records[1].relevance_score, 0.5);

        // Missing symbol degrades to an unreferenced record.
        assert_eq!(records[2].title, "No Symbol Corp");
        assert_eq!(records[2].url_or_reference, "");
        assert_eq!(records[2].body_text, "Price: $12.0");
    }

    #[test]
    fn test_document_chunks_cite_page() {
        let payload = json!({
            "chunks": [
                {"text": "Rebalance annually.", "source": "policy.pdf", "page": 4, "score": 0.83},
                {"text": "Untitled chunk"}
            ]
        });
        let inv = success("rag_query", SourceKind::Document, RawPayload::Json(payload));
        let records = ContextNormalizer.normalize(&inv).unwrap();

        assert_eq!(records[0].title, "policy.pdf (page 4)");
        assert_eq!(records[0].url_or_reference, "policy.pdf#page=4");
        assert_eq!(records[0].relevance_score, 0.83);
        assert_eq!(records[1].title, "Knowledge base");
        assert_eq!(records[1].url_or_reference, "");
    }

    #[test]
    fn test_normalize_all_keeps_invocation_order() {
        let web = success(
            "tavily_search",
            SourceKind::WebSearch,
            RawPayload::Json(json!({"results": [{"title": "w", "url": "u1"}]})),
        );
        let mut failed = ToolInvocation::pending("arxiv_search", SourceKind::Academic);
        failed.status = InvocationStatus::Error;
        let docs = success(
            "rag_query",
            SourceKind::Document,
            RawPayload::Json(json!({"chunks": [{"text": "d", "source": "s"}]})),
        );

        let records = ContextNormalizer.normalize_all(&[web, failed, docs]);
        let tools: Vec<&str> = records.iter().map(|r| r.source_tool.as_str()).collect();
        assert_eq!(tools, vec!["tavily_search", "rag_query"]);
    }

    #[test]
    fn test_body_truncation_respects_char_boundaries() {
        let text = "é".repeat(MAX_BODY_CHARS + 10);
        let cut = truncate_chars(&text, MAX_BODY_CHARS);
        assert_eq!(cut.chars().count(), MAX_BODY_CHARS);
        assert_eq!(truncate_chars("short", MAX_BODY_CHARS), "short");
    }

    #[test]
    fn test_positional_relevance_floor() {
        assert!((positional_relevance(0) - 0.8).abs() < 1e-9);
        assert!((positional_relevance(6) - 0.2).abs() < 1e-9);
        assert!((positional_relevance(50) - 0.2).abs() < 1e-9);
    }
}
