//! Parameter Resolver
//!
//! Maps a planned step's declared parameters to concrete values using the
//! namespace. Literals pass through, grammar-matching references are
//! substituted, near-miss references fall back to a pluggable semantic
//! strategy, and anything still unresolved fails the step with
//! `UnresolvedReference`. Resolution never crosses to a different symbol or
//! period than requested.

use crate::error::AgentError;
use crate::models::{Metric, Period, Step, Symbol};
use crate::namespace::{Namespace, NamespaceKey, ScalarValue};
use crate::Result;
use lazy_static::lazy_static;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use tracing::debug;

/// Pluggable lookup strategy behind the resolver.
pub trait ResolveStrategy: Send + Sync {
    fn resolve(&self, key: &str, namespace: &Namespace) -> Option<ScalarValue>;
}

/// Exact-match-only strategy.
pub struct ExactResolver;

impl ResolveStrategy for ExactResolver {
    fn resolve(&self, key: &str, namespace: &Namespace) -> Option<ScalarValue> {
        namespace.get(key).cloned()
    }
}

lazy_static! {
    /// Metric synonyms tolerated in near-miss references. Symbol and period
    /// are never reinterpreted, only the metric segment.
    static ref METRIC_SYNONYMS: HashMap<&'static str, Metric> = {
        let mut m = HashMap::new();
        m.insert("sales", Metric::Revenue);
        m.insert("turnover", Metric::Revenue);
        m.insert("revenues", Metric::Revenue);
        m.insert("earnings", Metric::Profit);
        m.insert("income", Metric::Profit);
        m.insert("net_profit", Metric::Profit);
        m.insert("profits", Metric::Profit);
        m.insert("cost", Metric::Expenses);
        m.insert("costs", Metric::Expenses);
        m.insert("spending", Metric::Expenses);
        m.insert("expense", Metric::Expenses);
        m.insert("invested", Metric::Investment);
        m.insert("capital", Metric::Investment);
        m.insert("investments", Metric::Investment);
        m.insert("return", Metric::Roi);
        m.insert("returns", Metric::Roi);
        m
    };
}

/// Semantic strategy: exact match first, then case folding and metric
/// synonyms within the same symbol + period.
pub struct FuzzyResolver;

impl FuzzyResolver {
    fn canonicalize(key: &str) -> Option<NamespaceKey> {
        let parts: Vec<&str> = key.split('_').collect();
        if parts.len() < 4 {
            return None;
        }

        let symbol = Symbol::from_str(parts[0]).ok()?;
        let period = Period::from_str(&format!("{}_{}", parts[1], parts[2])).ok()?;

        let mut metric_token = parts[3..].join("_").to_ascii_lowercase();
        let adjusted = if let Some(stripped) = metric_token.strip_suffix("_adjusted") {
            metric_token = stripped.to_string();
            true
        } else {
            false
        };

        let metric = Metric::from_str(&metric_token)
            .ok()
            .or_else(|| METRIC_SYNONYMS.get(metric_token.as_str()).copied())?;

        Some(NamespaceKey {
            symbol,
            period,
            metric,
            adjusted,
        })
    }
}

impl ResolveStrategy for FuzzyResolver {
    fn resolve(&self, key: &str, namespace: &Namespace) -> Option<ScalarValue> {
        if let Some(value) = namespace.get(key) {
            return Some(value.clone());
        }

        let canonical = Self::canonicalize(key)?.to_string();
        let value = namespace.get(&canonical)?;
        debug!(requested = %key, resolved = %canonical, "Fuzzy-resolved reference");
        Some(value.clone())
    }
}

/// A Step with all references substituted; key-typed parameters keep their
/// original key names so tools can derive output key names.
#[derive(Debug, Clone)]
pub struct ResolvedStep {
    pub step: Step,
    pub parameters: Value,
    pub references: BTreeMap<String, String>,
}

/// Resolves planned steps against the namespace.
pub struct ParameterResolver {
    strategy: Box<dyn ResolveStrategy>,
}

impl ParameterResolver {
    pub fn new(strategy: Box<dyn ResolveStrategy>) -> Self {
        Self { strategy }
    }

    /// Resolve every declared parameter of the step, or fail the whole step
    /// with the first unresolvable reference.
    pub fn resolve_step(&self, step: &Step, namespace: &Namespace) -> Result<ResolvedStep> {
        let Some(params) = step.parameters.as_object() else {
            return Err(AgentError::InvalidToolInput(
                "step parameters must be a JSON object".to_string(),
            ));
        };

        let mut resolved = Map::new();
        let mut references = BTreeMap::new();

        for (name, value) in params {
            match value {
                Value::String(s) if looks_like_reference(s) => {
                    let scalar = self
                        .strategy
                        .resolve(s, namespace)
                        .ok_or_else(|| AgentError::UnresolvedReference(s.clone()))?;
                    references.insert(name.clone(), s.clone());
                    resolved.insert(name.clone(), scalar.to_json());
                }
                Value::Array(items) => {
                    resolved.insert(name.clone(), self.resolve_list(items, namespace)?);
                }
                other => {
                    resolved.insert(name.clone(), other.clone());
                }
            }
        }

        Ok(ResolvedStep {
            step: step.clone(),
            parameters: Value::Object(resolved),
            references,
        })
    }

    /// A list of key references resolves to an object mapping key → value,
    /// preserving the names the tool will suffix or echo.
    fn resolve_list(&self, items: &[Value], namespace: &Namespace) -> Result<Value> {
        let mut out = Map::new();
        for (i, item) in items.iter().enumerate() {
            match item {
                Value::String(s) if looks_like_reference(s) => {
                    let scalar = self
                        .strategy
                        .resolve(s, namespace)
                        .ok_or_else(|| AgentError::UnresolvedReference(s.clone()))?;
                    out.insert(s.clone(), scalar.to_json());
                }
                Value::Number(n) => {
                    out.insert(format!("item{}", i), Value::Number(n.clone()));
                }
                other => {
                    return Err(AgentError::InvalidToolInput(format!(
                        "unexpected list element: {}",
                        other
                    )));
                }
            }
        }
        Ok(Value::Object(out))
    }
}

/// A string is treated as a reference candidate when its leading segments
/// name a known symbol and period. Plain literals ("AAPL", "Q1_2024", "bar")
/// pass through untouched.
fn looks_like_reference(s: &str) -> bool {
    let parts: Vec<&str> = s.split('_').collect();
    parts.len() >= 4
        && Symbol::from_str(parts[0]).is_ok()
        && Period::from_str(&format!("{}_{}", parts[1], parts[2])).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FunctionName;
    use serde_json::json;

    fn namespace() -> Namespace {
        let mut ns = Namespace::new();
        ns.merge(&json!({
            "AAPL": { "Q1_2024": { "revenue": 90.8, "investment": 24.6 } }
        }));
        ns
    }

    fn resolver() -> ParameterResolver {
        ParameterResolver::new(Box::new(FuzzyResolver))
    }

    #[test]
    fn test_exact_reference_substitution() {
        let step = Step {
            function_name: FunctionName::CalculateRoi,
            parameters: json!({
                "revenue": "AAPL_Q1_2024_revenue",
                "investment": "AAPL_Q1_2024_investment",
            }),
        };
        let resolved = resolver().resolve_step(&step, &namespace()).unwrap();
        assert_eq!(resolved.parameters["revenue"], json!(90.8));
        assert_eq!(resolved.parameters["investment"], json!(24.6));
        assert_eq!(
            resolved.references.get("revenue").map(String::as_str),
            Some("AAPL_Q1_2024_revenue")
        );
    }

    #[test]
    fn test_literals_pass_through() {
        let step = Step {
            function_name: FunctionName::GetFinancialData,
            parameters: json!({"symbol": "AAPL", "period": "Q1_2024"}),
        };
        let resolved = resolver().resolve_step(&step, &namespace()).unwrap();
        assert_eq!(resolved.parameters, step.parameters);
        assert!(resolved.references.is_empty());
    }

    #[test]
    fn test_fuzzy_metric_synonym() {
        let strategy = FuzzyResolver;
        let value = strategy.resolve("AAPL_Q1_2024_sales", &namespace());
        assert_eq!(value.and_then(|v| v.as_number()), Some(90.8));
    }

    #[test]
    fn test_fuzzy_case_folding() {
        let strategy = FuzzyResolver;
        let value = strategy.resolve("aapl_q1_2024_REVENUE", &namespace());
        assert_eq!(value.and_then(|v| v.as_number()), Some(90.8));
    }

    #[test]
    fn test_fuzzy_never_crosses_symbol_or_period() {
        let strategy = FuzzyResolver;
        assert!(strategy.resolve("MSFT_Q1_2024_revenue", &namespace()).is_none());
        assert!(strategy.resolve("AAPL_Q2_2024_sales", &namespace()).is_none());
    }

    #[test]
    fn test_unresolved_reference_fails_step() {
        let step = Step {
            function_name: FunctionName::CalculateRoi,
            parameters: json!({
                "revenue": "MSFT_Q1_2024_revenue",
                "investment": 10.0,
            }),
        };
        let err = resolver().resolve_step(&step, &namespace()).unwrap_err();
        assert_eq!(err.kind(), "UnresolvedReference");
    }

    #[test]
    fn test_key_list_resolves_to_keyed_map() {
        let step = Step {
            function_name: FunctionName::ApplyInflationAdjustment,
            parameters: json!({
                "values": ["AAPL_Q1_2024_revenue", "AAPL_Q1_2024_investment"],
                "rate": 0.031,
            }),
        };
        let resolved = resolver().resolve_step(&step, &namespace()).unwrap();
        assert_eq!(
            resolved.parameters["values"],
            json!({
                "AAPL_Q1_2024_revenue": 90.8,
                "AAPL_Q1_2024_investment": 24.6,
            })
        );
        assert_eq!(resolved.parameters["rate"], json!(0.031));
    }
}
