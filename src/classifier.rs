//! Query Classifier
//!
//! Maps a question to the capability tags whose adapters should be consulted.
//! Pure keyword/pattern matching: no I/O, never fails, and every question gets
//! at least one tag (document retrieval is the catch-all).
//!
//! Also assigns the coarse `QueryCategory` used for usage analytics.

use crate::models::{Capability, QueryCategory, Question};
use std::collections::BTreeSet;

/// Static keyword tables.
///
/// Single-word entries match as word prefixes ("rate" matches "rates" but not
/// "strategy"); entries with spaces or punctuation match as substrings.
const WEB_KEYWORDS: &[&str] = &[
    // Recency
    "news", "latest", "today", "current", "recent", "now", "this week", "this month",
    "yesterday", "headline",
    // Macro
    "outlook", "forecast", "rate", "inflation", "fed", "central bank", "economy",
    "recession", "earnings", "announce", "policy change",
];

const ACADEMIC_KEYWORDS: &[&str] = &[
    "research", "study", "studies", "paper", "academic", "evidence", "theory",
    "empirical", "literature", "model", "factor", "backtest", "arxiv", "journal",
    "hypothesis", "efficient market", "peer-reviewed",
];

const MARKET_DATA_KEYWORDS: &[&str] = &[
    "stock price", "share price", "quote", "ticker", "market cap", "dividend",
    "p/e", "trading at", "valuation", "52-week", "shares of", "volume",
];

const DOCUMENT_KEYWORDS: &[&str] = &[
    "portfolio", "retirement", "allocation", "diversif", "tax", "estate", "plan",
    "advice", "strategy", "401(k)", "401k", "ira", "roth", "wealth", "client",
    "guideline", "rebalanc", "annuit", "insurance", "budget", "saving",
];

/// Uppercase words that look like tickers but are not.
const TICKER_STOPLIST: &[&str] = &[
    "AI", "AM", "AN", "AND", "APR", "APY", "ARE", "AS", "AT", "ATH", "BE", "BY",
    "CAN", "CD", "CDS", "CEO", "CFO", "CPI", "DO", "EPS", "ESG", "ETF", "ETFS",
    "EU", "EUR", "FAQ", "FDIC", "FED", "FOMC", "FOR", "GDP", "HOW", "HSA", "IF",
    "IMO", "IN", "INC", "IPO", "IRA", "IRAS", "IRS", "IS", "IT", "LLC", "ME",
    "MY", "NOT", "NYSE", "OF", "OK", "ON", "OR", "PE", "QE", "REIT", "REITS",
    "ROI", "ROTH", "SEC", "SO", "THE", "TO", "UK", "US", "USA", "USD", "VS",
    "WHAT", "WHEN", "WHO", "WHY", "YTD",
];

/// Maximum symbols forwarded to the market-data adapter
pub const MAX_TICKERS: usize = 5;

/// Query classifier
pub struct QueryClassifier;

impl QueryClassifier {
    /// Capability tags relevant to a question (never empty).
    pub fn classify(question: &Question) -> BTreeSet<Capability> {
        Self::classify_text(question.text())
    }

    pub fn classify_text(text: &str) -> BTreeSet<Capability> {
        let mut tags = BTreeSet::new();

        let lowered = text.to_lowercase();
        let words = words(&lowered);

        if matches_any(&lowered, &words, WEB_KEYWORDS) {
            tags.insert(Capability::Web);
        }
        if matches_any(&lowered, &words, ACADEMIC_KEYWORDS) {
            tags.insert(Capability::Academic);
        }
        if matches_any(&lowered, &words, MARKET_DATA_KEYWORDS) || !extract_tickers(text).is_empty()
        {
            tags.insert(Capability::MarketData);
        }
        if matches_any(&lowered, &words, DOCUMENT_KEYWORDS) {
            tags.insert(Capability::Document);
        }

        if tags.is_empty() {
            tags.insert(Capability::Document);
        }

        tags
    }

    /// Coarse category of the question (first matching rule wins).
    pub fn categorize(text: &str) -> QueryCategory {
        let lowered = text.to_lowercase();
        let has = |kws: &[&str]| kws.iter().any(|kw| lowered.contains(kw));

        if has(&["investment", "portfolio", "asset"]) {
            QueryCategory::InvestmentAdvice
        } else if has(&["retirement", "planning", "future"]) {
            QueryCategory::RetirementPlanning
        } else if has(&["tax", "taxation", "deduction"]) {
            QueryCategory::TaxPlanning
        } else if has(&["risk", "volatility", "diversification"]) {
            QueryCategory::RiskManagement
        } else if has(&["market", "stock", "trading"]) {
            QueryCategory::MarketAnalysis
        } else {
            QueryCategory::GeneralAdvice
        }
    }
}

/// Ticker symbols mentioned in a question, in order of first appearance.
///
/// Accepts `$AAPL` (any case, 1–5 letters) or bare uppercase words of 2–5
/// letters that are not in the stop list.
pub fn extract_tickers(text: &str) -> Vec<String> {
    let mut tickers: Vec<String> = Vec::new();

    for raw in text.split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '(' | ')' | '/')) {
        let token = raw.trim_end_matches(|c: char| !c.is_ascii_alphanumeric());
        if token.is_empty() {
            continue;
        }

        let symbol = if let Some(rest) = token.strip_prefix('$') {
            if (1..=5).contains(&rest.len()) && rest.chars().all(|c| c.is_ascii_alphabetic()) {
                Some(rest.to_ascii_uppercase())
            } else {
                None
            }
        } else if (2..=5).contains(&token.len())
            && token.chars().all(|c| c.is_ascii_uppercase())
            && !TICKER_STOPLIST.contains(&token)
        {
            Some(token.to_string())
        } else {
            None
        };

        if let Some(symbol) = symbol {
            if !tickers.contains(&symbol) {
                tickers.push(symbol);
            }
        }

        if tickers.len() == MAX_TICKERS {
            break;
        }
    }

    tickers
}

fn words(lowered: &str) -> Vec<&str> {
    lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}

fn matches_any(lowered: &str, words: &[&str], keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| {
        if kw.chars().all(|c| c.is_alphanumeric()) {
            words.iter().any(|w| w.starts_with(kw))
        } else {
            lowered.contains(kw)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(text: &str) -> Vec<Capability> {
        QueryClassifier::classify_text(text).into_iter().collect()
    }

    #[test]
    fn test_every_question_gets_a_tag() {
        let long = "x".repeat(10_000);
        let cases = vec!["", "   ", "hello", "???", "\u{1F600}", long.as_str()];

        for c in cases {
            let result = QueryClassifier::classify_text(c);
            assert!(!result.is_empty(), "no tag for {:?}", c);
        }
    }

    #[test]
    fn test_fallback_is_document() {
        assert_eq!(tags(""), vec![Capability::Document]);
        assert_eq!(tags("hello there"), vec![Capability::Document]);
    }

    #[test]
    fn test_ticker_routes_to_market_data() {
        let result = tags("How is $tsla doing?");
        assert!(result.contains(&Capability::MarketData));

        let result = tags("Should I hold NVDA");
        assert!(result.contains(&Capability::MarketData));
    }

    #[test]
    fn test_multiple_tags_all_returned() {
        let result = tags("What does recent research say about AAPL and my retirement portfolio?");
        assert_eq!(
            result,
            vec![
                Capability::Web,
                Capability::Academic,
                Capability::MarketData,
                Capability::Document,
            ]
        );
    }

    #[test]
    fn test_word_prefix_matching() {
        // "strategy" contains "rate" as a substring but is not a rates question
        let result = tags("explain a barbell strategy");
        assert!(!result.contains(&Capability::Web));
        assert!(result.contains(&Capability::Document));

        let result = tags("where are interest rates heading");
        assert!(result.contains(&Capability::Web));
    }

    #[test]
    fn test_extract_tickers() {
        assert_eq!(extract_tickers("Compare AAPL, MSFT and $goog."), vec!["AAPL", "MSFT", "GOOG"]);
        assert!(extract_tickers("WHAT IS AN ETF FOR MY IRA?").is_empty());
        assert_eq!(extract_tickers("AAPL vs AAPL"), vec!["AAPL"]);
        assert_eq!(extract_tickers("AA BB CC DD EE FF GG").len(), MAX_TICKERS);
    }

    #[test]
    fn test_categorize() {
        let cases = vec![
            ("How should I rebalance my portfolio?", QueryCategory::InvestmentAdvice),
            ("Retirement at 55?", QueryCategory::RetirementPlanning),
            ("Is this tax deductible?", QueryCategory::TaxPlanning),
            ("How do I reduce volatility?", QueryCategory::RiskManagement),
            ("Is the stock market open?", QueryCategory::MarketAnalysis),
            ("hi", QueryCategory::GeneralAdvice),
        ];

        for (text, expected) in cases {
            assert_eq!(QueryClassifier::categorize(text), expected, "{}", text);
        }
    }
}
