//! Perception: natural-language query → structured [`Interpretation`]
//!
//! Interpretation only — no function planning happens here. The trait models
//! the external reasoning service as a fallible call; `RuleInterpreter` is the
//! deterministic implementation used by default and in tests.

use crate::classifier::ReasoningClassifier;
use crate::models::{
    ChartType, Confidence, Interpretation, Metric, Period, Symbol, UserPreferences,
};
use crate::namespace::{Namespace, NamespaceKey};
use crate::tools::published_inflation_rate;
use crate::Result;
use async_trait::async_trait;
use std::str::FromStr;
use tracing::debug;

#[async_trait]
pub trait Interpreter: Send + Sync {
    async fn interpret(
        &self,
        query: &str,
        prefs: &UserPreferences,
        namespace: &Namespace,
    ) -> Result<Interpretation>;
}

/// Keyword-driven interpreter. Extracts symbols, periods, metrics and wishes
/// from the query, then fills gaps from preferences, the session namespace
/// (follow-up turns like "adjust those figures" name no symbol of their own),
/// and the most-recent-period default, recording every assumption as a note
/// with a confidence downgrade.
pub struct RuleInterpreter;

#[async_trait]
impl Interpreter for RuleInterpreter {
    async fn interpret(
        &self,
        query: &str,
        prefs: &UserPreferences,
        namespace: &Namespace,
    ) -> Result<Interpretation> {
        let lowered = query.to_lowercase();
        let mut notes = Vec::new();
        let mut confidence = Confidence::High;

        let mut symbols = extract_symbols(&lowered);
        if symbols.is_empty() {
            let carried = carried_symbols(namespace);
            if let Some(symbol) = prefs.preferred_symbol {
                symbols.push(symbol);
                notes.push(format!("assumed preferred symbol {}", symbol));
                confidence.downgrade_to(Confidence::Medium);
            } else if !carried.is_empty() {
                notes.push(format!(
                    "carried symbols from earlier turns: {}",
                    carried
                        .iter()
                        .map(Symbol::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
                symbols = carried;
                confidence.downgrade_to(Confidence::Medium);
            } else {
                notes.push("no symbol mentioned and none could be inferred".to_string());
                confidence.downgrade_to(Confidence::Low);
            }
        }

        let mut periods = extract_periods(&lowered);
        if periods.is_empty() {
            let carried = carried_periods(namespace, &symbols);
            if let Some(n) = last_n_quarters(&lowered) {
                periods = Period::most_recent(n);
                notes.push(format!(
                    "resolved relative period to most recent: {}",
                    periods
                        .iter()
                        .map(Period::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            } else if let Some(period) = prefs.preferred_period {
                periods.push(period);
                notes.push(format!("assumed preferred period {}", period));
            } else if !carried.is_empty() {
                notes.push(format!(
                    "carried periods from earlier turns: {}",
                    carried
                        .iter()
                        .map(Period::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
                periods = carried;
            } else {
                periods.push(Period::latest());
                notes.push(format!(
                    "no period mentioned; defaulted to most recent ({})",
                    Period::latest()
                ));
            }
            confidence.downgrade_to(Confidence::Medium);
        }

        let metrics = extract_metrics(&lowered);
        let wants_roi = lowered.contains("roi") || lowered.contains("return on investment");

        let wants_inflation = lowered.contains("inflation")
            || prefs.want_inflation_adjustment == Some(true);
        let inflation_rate = if wants_inflation {
            extract_rate(&lowered).or_else(|| {
                if mentions_published_rate(&lowered) {
                    let year = periods.iter().map(|p| p.year()).max()?;
                    let rate = published_inflation_rate(year)?;
                    notes.push(format!("using published {} inflation rate {}", year, rate));
                    Some(rate)
                } else {
                    None
                }
            })
        } else {
            None
        };

        let wants_chart = lowered.contains("chart")
            || lowered.contains("plot")
            || lowered.contains("graph")
            || lowered.contains("visualize");
        let chart_type = if wants_chart {
            extract_chart_type(&lowered).or(prefs.preferred_chart)
        } else {
            None
        };

        let interpretation = Interpretation {
            request_text: query.trim().to_string(),
            tags: ReasoningClassifier::classify(query),
            symbols,
            periods,
            metrics,
            wants_roi,
            wants_inflation,
            inflation_rate,
            wants_chart,
            chart_type,
            notes,
            confidence,
        };

        debug!(
            symbols = ?interpretation.symbols,
            periods = ?interpretation.periods,
            confidence = %interpretation.confidence,
            "Query interpreted"
        );

        Ok(interpretation)
    }
}

/// Symbols already present in the session namespace, in key order.
fn carried_symbols(namespace: &Namespace) -> Vec<Symbol> {
    let mut symbols = Vec::new();
    for key in namespace.keys() {
        if let Some(parsed) = NamespaceKey::parse(key) {
            if !symbols.contains(&parsed.symbol) {
                symbols.push(parsed.symbol);
            }
        }
    }
    symbols
}

/// Periods the namespace already holds for the given symbols, most recent
/// first.
fn carried_periods(namespace: &Namespace, symbols: &[Symbol]) -> Vec<Period> {
    let mut periods = Vec::new();
    for key in namespace.keys() {
        if let Some(parsed) = NamespaceKey::parse(key) {
            if symbols.contains(&parsed.symbol) && !periods.contains(&parsed.period) {
                periods.push(parsed.period);
            }
        }
    }
    periods.sort();
    periods.reverse();
    periods
}

fn extract_symbols(lowered: &str) -> Vec<Symbol> {
    let mut symbols = Vec::new();
    for word in lowered.split(|c: char| !c.is_ascii_alphanumeric()) {
        if let Ok(symbol) = Symbol::from_str(word) {
            if !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }
    }
    symbols
}

fn extract_periods(lowered: &str) -> Vec<Period> {
    let mut periods = Vec::new();

    // Explicit quarters: "Q1 2024", "Q1_2024", "q2-2023".
    let chars: Vec<char> = lowered.chars().collect();
    for (i, window) in chars.windows(2).enumerate() {
        if window[0] == 'q' && window[1].is_ascii_digit() {
            let rest: String = chars[i..].iter().take(7).collect();
            let candidate = rest.replace(['-', ' '], "_");
            if let Ok(period) = Period::from_str(&candidate) {
                if !periods.contains(&period) {
                    periods.push(period);
                }
            }
        }
    }

    // Whole years: "all quarters of 2023", or a bare year mention.
    if periods.is_empty() {
        for year in [2023u16, 2024] {
            if lowered.contains(&year.to_string()) {
                periods.extend(Period::ALL.iter().filter(|p| p.year() == year));
            }
        }
    }

    periods.sort();
    periods
}

fn last_n_quarters(lowered: &str) -> Option<usize> {
    let idx = lowered.find("quarter")?;
    let before = &lowered[..idx];
    if !before.contains("last") && !before.contains("past") && !before.contains("previous") {
        return None;
    }

    let count = before
        .split_whitespace()
        .rev()
        .take(3)
        .find_map(|word| match word {
            "one" => Some(1),
            "two" => Some(2),
            "three" => Some(3),
            "four" => Some(4),
            "five" => Some(5),
            "six" => Some(6),
            other => other.parse::<usize>().ok(),
        })
        .unwrap_or(1);

    Some(count.min(Period::ALL.len()))
}

fn extract_metrics(lowered: &str) -> Vec<Metric> {
    let mut metrics = Vec::new();
    let synonyms: [(&str, Metric); 8] = [
        ("revenue", Metric::Revenue),
        ("sales", Metric::Revenue),
        ("investment", Metric::Investment),
        ("profit", Metric::Profit),
        ("earnings", Metric::Profit),
        ("income", Metric::Profit),
        ("expense", Metric::Expenses),
        ("cost", Metric::Expenses),
    ];
    for (word, metric) in synonyms {
        if lowered.contains(word) && !metrics.contains(&metric) {
            metrics.push(metric);
        }
    }
    metrics
}

/// Parse an explicit rate: "4.5%", "at 3 percent", "rate of 0.03".
fn extract_rate(lowered: &str) -> Option<f64> {
    let tokens: Vec<&str> = lowered.split_whitespace().collect();

    for (i, token) in tokens.iter().enumerate() {
        let trimmed = token.trim_matches(|c: char| !c.is_ascii_digit() && c != '.' && c != '%');
        if let Some(stripped) = trimmed.strip_suffix('%') {
            if let Ok(pct) = stripped.parse::<f64>() {
                return Some(pct / 100.0);
            }
        }
        if *token == "percent" || *token == "pct" {
            if let Some(prev) = i.checked_sub(1).and_then(|j| tokens.get(j)) {
                if let Ok(pct) = prev.trim_matches(|c: char| !c.is_ascii_digit() && c != '.').parse::<f64>() {
                    return Some(pct / 100.0);
                }
            }
        }
    }

    // Decimal form only after "rate": a bare "0.03" elsewhere is ambiguous.
    let after_rate = lowered.split("rate").nth(1)?;
    after_rate
        .split_whitespace()
        .take(3)
        .find_map(|w| w.trim_matches(|c: char| !c.is_ascii_digit() && c != '.').parse::<f64>().ok())
        .filter(|r| *r > 0.0 && *r < 1.0)
}

fn mentions_published_rate(lowered: &str) -> bool {
    lowered.contains("published rate")
        || lowered.contains("official rate")
        || lowered.contains("current rate")
        || lowered.contains("published inflation")
}

fn extract_chart_type(lowered: &str) -> Option<ChartType> {
    for chart in [ChartType::Bar, ChartType::Line, ChartType::Pie] {
        if lowered.contains(chart.as_str()) {
            return Some(chart);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn interpret(query: &str) -> Interpretation {
        RuleInterpreter
            .interpret(query, &UserPreferences::default(), &Namespace::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_last_two_quarters_default() {
        let interp = interpret("compare ROI for AAPL last two quarters").await;
        assert_eq!(interp.symbols, vec![Symbol::AAPL]);
        assert_eq!(interp.periods, vec![Period::Q2_2024, Period::Q1_2024]);
        assert!(interp.wants_roi);
        assert!(interp.confidence <= Confidence::Medium);
    }

    #[tokio::test]
    async fn test_explicit_quarter_and_symbol() {
        let interp = interpret("What was Microsoft's profit in Q2 2024?").await;
        assert_eq!(interp.symbols, vec![Symbol::MSFT]);
        assert_eq!(interp.periods, vec![Period::Q2_2024]);
        assert_eq!(interp.metrics, vec![Metric::Profit]);
        assert_eq!(interp.confidence, Confidence::High);
    }

    #[tokio::test]
    async fn test_full_year_extraction() {
        let interp = interpret("Show me a bar chart of Amazon's revenue for all quarters of 2023").await;
        assert_eq!(interp.symbols, vec![Symbol::AMZN]);
        assert_eq!(interp.periods.len(), 4);
        assert!(interp.periods.iter().all(|p| p.year() == 2023));
        assert!(interp.wants_chart);
        assert_eq!(interp.chart_type, Some(ChartType::Bar));
    }

    #[tokio::test]
    async fn test_inflation_without_rate() {
        let interp = interpret("adjust AAPL revenue for inflation").await;
        assert!(interp.wants_inflation);
        assert_eq!(interp.inflation_rate, None);
    }

    #[tokio::test]
    async fn test_inflation_with_explicit_rate() {
        let interp = interpret("adjust AAPL revenue for inflation at 4.5%").await;
        assert_eq!(interp.inflation_rate, Some(0.045));
    }

    #[tokio::test]
    async fn test_inflation_with_published_rate() {
        let interp = interpret("adjust AAPL Q1 2024 revenue for inflation at the published rate").await;
        assert_eq!(interp.inflation_rate, Some(0.031));
    }

    #[tokio::test]
    async fn test_missing_symbol_is_low_confidence() {
        let interp = interpret("show revenue for the latest quarter").await;
        assert!(interp.symbols.is_empty());
        assert_eq!(interp.confidence, Confidence::Low);
        assert!(!interp.notes.is_empty());
    }

    #[tokio::test]
    async fn test_missing_period_defaults_to_latest() {
        let interp = interpret("show AAPL revenue").await;
        assert_eq!(interp.periods, vec![Period::latest()]);
        assert!(interp.confidence <= Confidence::Medium);
    }

    #[tokio::test]
    async fn test_preferences_fill_gaps() {
        let prefs = UserPreferences {
            preferred_symbol: Some(Symbol::MSFT),
            preferred_period: Some(Period::Q4_2023),
            ..Default::default()
        };
        let interp = RuleInterpreter
            .interpret("how did revenue look?", &prefs, &Namespace::new())
            .await
            .unwrap();
        assert_eq!(interp.symbols, vec![Symbol::MSFT]);
        assert_eq!(interp.periods, vec![Period::Q4_2023]);
        assert_eq!(interp.confidence, Confidence::Medium);
    }

    #[tokio::test]
    async fn test_follow_up_carries_session_context() {
        let mut ns = Namespace::new();
        ns.merge(&serde_json::json!({
            "AAPL": {
                "Q1_2024": { "revenue": 90.8, "investment": 24.6 },
                "Q2_2024": { "revenue": 85.3, "investment": 24.1 },
            }
        }));
        ns.merge(&serde_json::json!({ "AAPL_Q2_2024_ROI": 2.539 }));

        let interp = RuleInterpreter
            .interpret(
                "Adjust those ROI figures for inflation at the published rate",
                &UserPreferences::default(),
                &ns,
            )
            .await
            .unwrap();

        assert_eq!(interp.symbols, vec![Symbol::AAPL]);
        assert_eq!(interp.periods, vec![Period::Q2_2024, Period::Q1_2024]);
        assert!(interp.wants_inflation);
        assert_eq!(interp.inflation_rate, Some(0.031));
        assert_eq!(interp.confidence, Confidence::Medium);
        assert!(interp.notes.iter().any(|n| n.contains("carried")));
    }
}
