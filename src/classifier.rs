//! Reasoning-mode classifier
//!
//! Labels a query with the dominant cognitive operations used to interpret
//! it (arithmetic, comparison, lookup, ...). The tags prefix the
//! `interpreted_request` string in the plan output.

use crate::models::ReasoningTag;

/// Static keyword lists — zero allocation
const ARITHMETIC_KEYWORDS: &[&str] = &[
    "roi", "return on investment", "margin", "ratio", "percent", "%",
    "adjust", "adjusted", "inflation", "calculate", "compute",
];

const COMPARISON_KEYWORDS: &[&str] = &[
    "compare", "versus", "vs", "against", "better", "worse", "higher",
    "lower", "between", "difference",
];

const LOOKUP_KEYWORDS: &[&str] = &[
    "show", "what was", "what is", "fetch", "get", "revenue", "profit",
    "expenses", "investment", "data",
];

const AGGREGATION_KEYWORDS: &[&str] = &[
    "all quarters", "total", "sum", "average", "overall", "across",
    "each quarter", "every quarter",
];

const PLANNING_KEYWORDS: &[&str] = &["and then", "then", "after that", "first", "finally"];

/// Reasoning-mode classifier over query text
pub struct ReasoningClassifier;

impl ReasoningClassifier {
    /// Classify a query into its reasoning-mode tags, most dominant first.
    /// Always returns at least one tag so the output prefix is well-formed.
    pub fn classify(query: &str) -> Vec<ReasoningTag> {
        let lowered = query.to_lowercase();
        let contains_any =
            |keywords: &[&str]| keywords.iter().any(|kw| lowered.contains(*kw));

        let mut tags = Vec::new();

        if contains_any(COMPARISON_KEYWORDS) {
            tags.push(ReasoningTag::Comparison);
        }
        if contains_any(ARITHMETIC_KEYWORDS) {
            tags.push(ReasoningTag::Arithmetic);
        }
        if contains_any(AGGREGATION_KEYWORDS) {
            tags.push(ReasoningTag::Aggregation);
        }
        if contains_any(LOOKUP_KEYWORDS) {
            tags.push(ReasoningTag::Lookup);
        }
        if contains_any(PLANNING_KEYWORDS) || tags.len() > 1 {
            tags.push(ReasoningTag::Planning);
        }

        // Chart generation and multi-step retrieval both go through tools.
        if lowered.contains("chart") || lowered.contains("plot") || lowered.contains("graph") {
            tags.push(ReasoningTag::ToolUse);
        }

        if tags.is_empty() {
            tags.push(ReasoningTag::Lookup);
        }

        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparison_and_arithmetic() {
        let tags = ReasoningClassifier::classify(
            "Compare ROI for AAPL for the last two quarters adjusted for inflation",
        );
        assert!(tags.contains(&ReasoningTag::Comparison));
        assert!(tags.contains(&ReasoningTag::Arithmetic));
        assert_eq!(tags[0], ReasoningTag::Comparison);
    }

    #[test]
    fn test_plain_lookup() {
        let tags = ReasoningClassifier::classify("What was Microsoft's profit in Q2 2024?");
        assert!(tags.contains(&ReasoningTag::Lookup));
    }

    #[test]
    fn test_chart_implies_tool_use() {
        let tags = ReasoningClassifier::classify(
            "Show me a bar chart of Amazon's revenue for all quarters of 2023",
        );
        assert!(tags.contains(&ReasoningTag::ToolUse));
        assert!(tags.contains(&ReasoningTag::Aggregation));
    }

    #[test]
    fn test_never_empty() {
        assert!(!ReasoningClassifier::classify("hello").is_empty());
    }
}
