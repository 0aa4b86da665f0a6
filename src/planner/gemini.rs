//! Gemini-backed planner
//!
//! Asks the external reasoning service for the single next tool call as
//! strict JSON. The call is a fallible blocking round-trip; transport and
//! parse failures surface as `PlannerUnavailable` so the loop can retry once
//! and then abort the turn with progress preserved.

use crate::error::AgentError;
use crate::gemini::GeminiClient;
use crate::models::{FunctionName, Step};
use crate::planner::{Planner, PlannerDecision, PlanningContext};
use crate::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::str::FromStr;

pub struct GeminiPlanner {
    client: GeminiClient,
}

impl GeminiPlanner {
    pub fn new(api_key: String) -> Self {
        Self {
            client: GeminiClient::new(api_key),
        }
    }

    /// Build the structured planning prompt
    fn build_prompt(&self, ctx: &PlanningContext<'_>) -> String {
        let namespace: Value = ctx
            .namespace
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_json()))
            .collect::<serde_json::Map<String, Value>>()
            .into();

        let executed: Vec<&str> = ctx
            .history
            .iter()
            .map(|s| s.step.function_name.as_str())
            .collect();

        format!(
            r#"You are a finance decision planner. Suggest only the next safe tool call
based on the current context and already executed steps.

Allowed functions: get_financial_data(symbol, period), calculate_roi(revenue, investment),
apply_inflation_adjustment(values, rate), generate_chart(data, chart_type)

Context: {}
Executed steps: {}
Interpretation: {}
Preferences: {}

Rules:
1. Return only one next step at a time.
2. Respect dependencies: get_financial_data -> calculate_roi -> apply_inflation_adjustment -> generate_chart.
3. Treat each mentioned period as a separate get_financial_data step.
4. Skip steps whose outputs already exist in the context.
5. Reference context values by their key (e.g. "AAPL_Q1_2024_revenue"), never by guessed numbers.
6. Never invent an inflation rate; if none is available, do not plan the adjustment.
7. Return STRICT JSON: {{ "function_name": "...", "parameters": {{...}} }}
8. If all steps are completed, return {{}} (empty object)."#,
            namespace,
            json!(executed),
            serde_json::to_string(ctx.interpretation).unwrap_or_default(),
            serde_json::to_string(ctx.preferences).unwrap_or_default(),
        )
    }
}

#[async_trait]
impl Planner for GeminiPlanner {
    async fn propose_next_step(&self, ctx: &PlanningContext<'_>) -> Result<PlannerDecision> {
        let prompt = self.build_prompt(ctx);

        let response = self
            .client
            .generate(&prompt)
            .await
            .map_err(|e| AgentError::PlannerUnavailable(e.to_string()))?;

        parse_decision(&response)
    }
}

/// Parse the planner response: a single step object, or `{}` for completion.
fn parse_decision(response: &str) -> Result<PlannerDecision> {
    let cleaned = response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let value: Value = serde_json::from_str(cleaned).map_err(|e| {
        AgentError::PlannerUnavailable(format!("unparseable planner response: {} | raw={}", e, response))
    })?;

    let Some(name) = value.get("function_name").and_then(Value::as_str) else {
        return Ok(PlannerDecision::Complete);
    };

    let function_name = FunctionName::from_str(name).map_err(|_| {
        AgentError::PlannerUnavailable(format!("planner proposed unknown tool '{}'", name))
    })?;

    let parameters = value.get("parameters").cloned().unwrap_or_else(|| json!({}));

    Ok(PlannerDecision::Next(Step {
        function_name,
        parameters,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_step() {
        let decision = parse_decision(
            r#"{"function_name": "get_financial_data", "parameters": {"symbol": "AAPL", "period": "Q1_2024"}}"#,
        )
        .unwrap();
        match decision {
            PlannerDecision::Next(step) => {
                assert_eq!(step.function_name, FunctionName::GetFinancialData);
                assert_eq!(step.parameters["symbol"], "AAPL");
            }
            PlannerDecision::Complete => panic!("expected a step"),
        }
    }

    #[test]
    fn test_parse_fenced_response() {
        let decision = parse_decision(
            "```json\n{\"function_name\": \"calculate_roi\", \"parameters\": {}}\n```",
        )
        .unwrap();
        assert!(matches!(decision, PlannerDecision::Next(_)));
    }

    #[test]
    fn test_empty_object_means_complete() {
        assert_eq!(parse_decision("{}").unwrap(), PlannerDecision::Complete);
    }

    #[test]
    fn test_unknown_tool_is_planner_failure() {
        let err = parse_decision(r#"{"function_name": "hallucinated_tool"}"#).unwrap_err();
        assert_eq!(err.kind(), "PlannerUnavailable");
    }

    #[test]
    fn test_garbage_is_planner_failure() {
        assert!(parse_decision("not json at all").is_err());
    }
}
