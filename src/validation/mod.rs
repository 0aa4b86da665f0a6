//! Plan validation
//!
//! Rule-based checks applied to an assembled plan before it leaves the
//! agent. A plan that fails validation is replaced by the minimal fallback
//! rather than emitted malformed.

use crate::models::{Confidence, FunctionName, PlanResult};
use crate::namespace::NamespaceKey;
use serde_json::Value;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub issues: Vec<String>,
}

impl ValidationResult {
    fn ok() -> Self {
        Self {
            is_valid: true,
            issues: Vec::new(),
        }
    }
}

const KNOWN_TAGS: [&str; 7] = [
    "arithmetic",
    "logic",
    "lookup",
    "planning",
    "tool_use",
    "comparison",
    "aggregation",
];

/// Validates assembled plans against the output contract.
pub struct PlanValidator;

impl PlanValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, plan: &PlanResult) -> ValidationResult {
        let mut result = ValidationResult::ok();

        self.check_reasoning_prefix(plan, &mut result);
        self.check_function_calls(plan, &mut result);
        self.check_non_empty(plan, &mut result);

        if !result.is_valid {
            warn!(issues = ?result.issues, "Plan failed validation");
        }
        result
    }

    /// `interpreted_request` must read `[reasoning: tag+tag+...] <text>` with
    /// every tag drawn from the known vocabulary.
    fn check_reasoning_prefix(&self, plan: &PlanResult, result: &mut ValidationResult) {
        let request = &plan.interpreted_request;

        let Some(rest) = request.strip_prefix("[reasoning: ") else {
            fail(result, "interpreted_request missing [reasoning: ...] prefix");
            return;
        };
        let Some((tags, text)) = rest.split_once("] ") else {
            fail(result, "reasoning prefix is not closed by '] '");
            return;
        };

        if text.trim().is_empty() {
            fail(result, "interpreted_request has no text after the prefix");
        }
        for tag in tags.split('+') {
            if !KNOWN_TAGS.contains(&tag) {
                fail(result, &format!("unknown reasoning tag '{}'", tag));
            }
        }
    }

    /// Every call must name a known tool, carry an object for parameters,
    /// include that tool's required parameters, and use only well-formed
    /// namespace keys where a parameter holds a reference.
    fn check_function_calls(&self, plan: &PlanResult, result: &mut ValidationResult) {
        for (i, call) in plan.function_calls.iter().enumerate() {
            let Some(params) = call.parameters.as_object() else {
                fail(result, &format!("call {}: parameters is not an object", i));
                continue;
            };

            for &required in required_parameters(call.function_name) {
                if !params.contains_key(required) {
                    fail(
                        result,
                        &format!("call {} ({}): missing parameter '{}'", i, call.function_name, required),
                    );
                }
            }

            for (name, value) in params {
                check_reference_grammar(i, name, value, result);
            }
        }
    }

    /// An empty plan is only acceptable at low confidence, where the
    /// interpreted request itself carries the explanation.
    fn check_non_empty(&self, plan: &PlanResult, result: &mut ValidationResult) {
        if plan.function_calls.is_empty() && plan.confidence != Confidence::Low {
            fail(result, "empty function_calls at non-low confidence");
        }
    }
}

impl Default for PlanValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn fail(result: &mut ValidationResult, issue: &str) {
    result.is_valid = false;
    result.issues.push(issue.to_string());
}

fn required_parameters(function_name: FunctionName) -> &'static [&'static str] {
    match function_name {
        FunctionName::GetFinancialData => &["symbol", "period"],
        FunctionName::CalculateRoi => &["revenue", "investment"],
        FunctionName::ApplyInflationAdjustment => &["values", "rate"],
        FunctionName::GenerateChart => &["data", "chart_type"],
    }
}

/// Strings shaped like `SYMBOL_Qn_YYYY_...` must parse under the full key
/// grammar; lists of references are checked element-wise.
fn check_reference_grammar(call: usize, name: &str, value: &Value, result: &mut ValidationResult) {
    match value {
        Value::String(s) if s.contains('_') && s.chars().next().is_some_and(|c| c.is_ascii_uppercase()) => {
            let parts: Vec<&str> = s.split('_').collect();
            if parts.len() >= 4
                && crate::models::Symbol::from_str(parts[0]).is_ok()
                && NamespaceKey::parse(s).is_none()
            {
                fail(
                    result,
                    &format!("call {}: parameter '{}' holds malformed key '{}'", call, name, s),
                );
            }
        }
        Value::Array(items) => {
            for item in items {
                check_reference_grammar(call, name, item, result);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FunctionCall;
    use serde_json::json;

    fn valid_plan() -> PlanResult {
        PlanResult {
            interpreted_request: "[reasoning: comparison+arithmetic] Compare ROI for AAPL".into(),
            function_calls: vec![
                FunctionCall {
                    function_name: FunctionName::GetFinancialData,
                    parameters: json!({"symbol": "AAPL", "period": "Q1_2024"}),
                },
                FunctionCall {
                    function_name: FunctionName::CalculateRoi,
                    parameters: json!({
                        "revenue": "AAPL_Q1_2024_revenue",
                        "investment": "AAPL_Q1_2024_investment",
                    }),
                },
            ],
            confidence: Confidence::High,
        }
    }

    #[test]
    fn test_valid_plan_passes() {
        let result = PlanValidator::new().validate(&valid_plan());
        assert!(result.is_valid, "{:?}", result.issues);
    }

    #[test]
    fn test_missing_prefix_fails() {
        let mut plan = valid_plan();
        plan.interpreted_request = "Compare ROI for AAPL".into();
        assert!(!PlanValidator::new().validate(&plan).is_valid);
    }

    #[test]
    fn test_unknown_tag_fails() {
        let mut plan = valid_plan();
        plan.interpreted_request = "[reasoning: vibes] Compare ROI".into();
        assert!(!PlanValidator::new().validate(&plan).is_valid);
    }

    #[test]
    fn test_missing_required_parameter_fails() {
        let mut plan = valid_plan();
        plan.function_calls[0].parameters = json!({"symbol": "AAPL"});
        let result = PlanValidator::new().validate(&plan);
        assert!(!result.is_valid);
        assert!(result.issues[0].contains("period"));
    }

    #[test]
    fn test_malformed_key_fails() {
        let mut plan = valid_plan();
        plan.function_calls[1].parameters = json!({
            "revenue": "AAPL_Q1_2024_velocity",
            "investment": "AAPL_Q1_2024_investment",
        });
        assert!(!PlanValidator::new().validate(&plan).is_valid);
    }

    #[test]
    fn test_empty_calls_require_low_confidence() {
        let mut plan = valid_plan();
        plan.function_calls.clear();
        assert!(!PlanValidator::new().validate(&plan).is_valid);

        plan.confidence = Confidence::Low;
        assert!(PlanValidator::new().validate(&plan).is_valid);
    }

    #[test]
    fn test_required_parameter_check_covers_every_tool() {
        for name in FunctionName::ALL {
            let mut plan = valid_plan();
            plan.function_calls = vec![FunctionCall {
                function_name: name,
                parameters: json!({}),
            }];
            let result = PlanValidator::new().validate(&plan);
            assert!(!result.is_valid, "{} accepted empty parameters", name);
        }
    }
}
