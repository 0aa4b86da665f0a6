//! Reference Namespace
//!
//! Flat mapping from canonical string key to scalar value. Tool results are
//! flattened into keys of the form `<SYMBOL>_<PERIOD>_<metric>[_adjusted]`,
//! one prefix level per nesting level, until leaves are scalars.

use crate::models::{Metric, Period, Symbol};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Scalar namespace value: number or string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ScalarValue {
    Number(f64),
    Text(String),
}

impl ScalarValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ScalarValue::Number(n) => Some(*n),
            ScalarValue::Text(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ScalarValue::Number(n) => serde_json::json!(n),
            ScalarValue::Text(s) => Value::String(s.clone()),
        }
    }

    fn same_kind(&self, other: &ScalarValue) -> bool {
        matches!(
            (self, other),
            (ScalarValue::Number(_), ScalarValue::Number(_))
                | (ScalarValue::Text(_), ScalarValue::Text(_))
        )
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Number(n) => write!(f, "{}", n),
            ScalarValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Parsed form of the reference-key grammar
/// `<SYMBOL>_<PERIOD>_<metric>[_adjusted]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceKey {
    pub symbol: Symbol,
    pub period: Period,
    pub metric: Metric,
    pub adjusted: bool,
}

impl NamespaceKey {
    pub fn new(symbol: Symbol, period: Period, metric: Metric) -> Self {
        Self {
            symbol,
            period,
            metric,
            adjusted: false,
        }
    }

    /// Parse a candidate key against the grammar. Returns `None` for
    /// literals and malformed references.
    pub fn parse(key: &str) -> Option<NamespaceKey> {
        let mut parts = key.split('_');

        let symbol = Symbol::from_str(parts.next()?).ok()?;
        // Period spans two underscore-separated segments: Q1_2024.
        let quarter = parts.next()?;
        let year = parts.next()?;
        let period = Period::from_str(&format!("{}_{}", quarter, year)).ok()?;
        let metric = Metric::from_str(parts.next()?).ok()?;

        let adjusted = match parts.next() {
            None => false,
            Some("adjusted") if parts.next().is_none() => true,
            Some(_) => return None,
        };

        Some(NamespaceKey {
            symbol,
            period,
            metric,
            adjusted,
        })
    }
}

impl fmt::Display for NamespaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.symbol, self.period, self.metric)?;
        if self.adjusted {
            write!(f, "_adjusted")?;
        }
        Ok(())
    }
}

/// The growing per-session namespace of typed result keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Namespace {
    entries: BTreeMap<String, ScalarValue>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&ScalarValue> {
        self.entries.get(key)
    }

    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(ScalarValue::as_number)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScalarValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Insert one scalar. Last write wins for same-kind overwrites (adjusted
    /// recomputation is the common case); an overwrite that would change the
    /// value kind is rejected so later readers never see an incompatible type.
    /// Returns whether the value was written.
    pub fn insert(&mut self, key: impl Into<String>, value: ScalarValue) -> bool {
        let key = key.into();
        match self.entries.get(&key) {
            Some(existing) if !existing.same_kind(&value) => {
                warn!(
                    key = %key,
                    existing = %existing,
                    incoming = %value,
                    "Rejected namespace overwrite with incompatible type"
                );
                false
            }
            Some(existing) if *existing != value => {
                warn!(
                    key = %key,
                    old = %existing,
                    new = %value,
                    "Namespace key overwritten with a different value"
                );
                self.entries.insert(key, value);
                true
            }
            _ => {
                self.entries.insert(key, value);
                true
            }
        }
    }

    /// Merge a flat-keyed tool result. Top-level scalars are inserted as-is;
    /// nested objects are flattened via prefix concatenation. Idempotent for
    /// identical inputs.
    pub fn merge(&mut self, result: &Value) {
        let Some(object) = result.as_object() else {
            warn!("Ignoring non-object tool result during namespace merge");
            return;
        };

        for (key, value) in object {
            self.merge_entry(key, value);
        }
    }

    fn merge_entry(&mut self, prefix: &str, value: &Value) {
        match value {
            Value::Object(nested) => {
                for (sub_key, sub_value) in nested {
                    let key = format!("{}_{}", prefix, sub_key);
                    self.merge_entry(&key, sub_value);
                }
            }
            Value::Number(n) => {
                if let Some(f) = n.as_f64() {
                    self.insert(prefix, ScalarValue::Number(f));
                }
            }
            Value::String(s) => {
                self.insert(prefix, ScalarValue::Text(s.clone()));
            }
            Value::Bool(b) => {
                self.insert(prefix, ScalarValue::Text(b.to_string()));
            }
            Value::Null | Value::Array(_) => {
                warn!(key = %prefix, "Skipping non-scalar leaf during namespace merge");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_round_trip() {
        let mut ns = Namespace::new();
        ns.merge(&json!({ "AAPL": { "Q1_2024": { "revenue": 90.8 } } }));
        assert_eq!(ns.get_number("AAPL_Q1_2024_revenue"), Some(90.8));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut ns = Namespace::new();
        let result = json!({ "MSFT": { "Q2_2024": { "revenue": 64.7, "profit": 22.5 } } });
        ns.merge(&result);
        let snapshot = ns.clone();
        ns.merge(&result);
        assert_eq!(ns, snapshot);
    }

    #[test]
    fn test_top_level_scalar_merge() {
        let mut ns = Namespace::new();
        ns.merge(&json!({ "AAPL_Q2_2024_ROI": 2.539 }));
        assert_eq!(ns.get_number("AAPL_Q2_2024_ROI"), Some(2.539));
    }

    #[test]
    fn test_same_kind_overwrite_is_last_write_wins() {
        let mut ns = Namespace::new();
        assert!(ns.insert("AAPL_Q1_2024_revenue_adjusted", ScalarValue::Number(93.6)));
        assert!(ns.insert("AAPL_Q1_2024_revenue_adjusted", ScalarValue::Number(93.7)));
        assert_eq!(ns.get_number("AAPL_Q1_2024_revenue_adjusted"), Some(93.7));
    }

    #[test]
    fn test_incompatible_overwrite_rejected() {
        let mut ns = Namespace::new();
        ns.insert("AAPL_Q1_2024_revenue", ScalarValue::Number(90.8));
        assert!(!ns.insert("AAPL_Q1_2024_revenue", ScalarValue::Text("n/a".into())));
        assert_eq!(ns.get_number("AAPL_Q1_2024_revenue"), Some(90.8));
    }

    #[test]
    fn test_key_grammar_parse() {
        let key = NamespaceKey::parse("AAPL_Q1_2024_revenue").unwrap();
        assert_eq!(key.symbol, Symbol::AAPL);
        assert_eq!(key.period, Period::Q1_2024);
        assert_eq!(key.metric, Metric::Revenue);
        assert!(!key.adjusted);

        let adjusted = NamespaceKey::parse("MSFT_Q2_2023_expenses_adjusted").unwrap();
        assert!(adjusted.adjusted);
        assert_eq!(adjusted.to_string(), "MSFT_Q2_2023_expenses_adjusted");
    }

    #[test]
    fn test_key_grammar_rejects_literals() {
        assert!(NamespaceKey::parse("0.045").is_none());
        assert!(NamespaceKey::parse("bar").is_none());
        assert!(NamespaceKey::parse("GOOG_Q1_2024_revenue").is_none());
        assert!(NamespaceKey::parse("AAPL_Q3_2024_revenue").is_none());
        assert!(NamespaceKey::parse("AAPL_Q1_2024_margin").is_none());
        assert!(NamespaceKey::parse("AAPL_Q1_2024_revenue_adjusted_twice").is_none());
    }

    #[test]
    fn test_roi_key_round_trip() {
        let key = NamespaceKey::new(Symbol::AMZN, Period::Q2_2024, Metric::Roi);
        assert_eq!(key.to_string(), "AMZN_Q2_2024_ROI");
        assert_eq!(NamespaceKey::parse("AMZN_Q2_2024_ROI"), Some(key));
    }
}
