//! Step executor
//!
//! Turns a resolved step into an immutable ExecutedStep. Deterministic —
//! the LLM is not allowed here. Tool failures are captured in the outcome
//! rather than propagated, so the loop can recover locally.

use crate::error::AgentError;
use crate::models::{ExecutedStep, StepOutcome};
use crate::resolver::ResolvedStep;
use crate::tools::{ToolInput, ToolRegistry};
use chrono::Utc;
use std::time::Instant;
use tracing::{debug, warn};

pub struct StepExecutor {
    tool_registry: ToolRegistry,
}

impl StepExecutor {
    pub fn new(tool_registry: ToolRegistry) -> Self {
        Self { tool_registry }
    }

    pub async fn execute(&self, resolved: &ResolvedStep) -> ExecutedStep {
        let function_name = resolved.step.function_name;
        debug!(tool = %function_name, "Executing step");

        let start = Instant::now();

        let outcome = match self.tool_registry.get(function_name) {
            Some(tool) => {
                let input = ToolInput {
                    function_name,
                    parameters: resolved.parameters.clone(),
                    references: resolved.references.clone(),
                };
                match tool.execute(&input).await {
                    Ok(output) => StepOutcome::Success {
                        result: output.data,
                    },
                    Err(e) => {
                        warn!(tool = %function_name, error = %e, "Tool execution failed");
                        StepOutcome::Failed {
                            reason: e.kind().to_string(),
                            detail: e.to_string(),
                        }
                    }
                }
            }
            None => {
                let e = AgentError::ToolNotFound(function_name.to_string());
                warn!(tool = %function_name, "Tool not registered");
                StepOutcome::Failed {
                    reason: e.kind().to_string(),
                    detail: e.to_string(),
                }
            }
        };

        ExecutedStep {
            step: resolved.step.clone(),
            resolved_parameters: resolved.parameters.clone(),
            outcome,
            execution_time_ms: start.elapsed().as_millis() as u64,
            executed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FunctionName, Step};
    use crate::tools::{create_default_registry, ToolRegistry};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn resolved(function_name: FunctionName, parameters: serde_json::Value) -> ResolvedStep {
        ResolvedStep {
            step: Step {
                function_name,
                parameters: parameters.clone(),
            },
            parameters,
            references: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_successful_execution() {
        let executor = StepExecutor::new(create_default_registry());
        let executed = executor
            .execute(&resolved(
                FunctionName::GetFinancialData,
                json!({"symbol": "MSFT", "period": "Q2_2024"}),
            ))
            .await;
        match executed.outcome {
            StepOutcome::Success { result } => {
                assert_eq!(result["MSFT"]["Q2_2024"]["revenue"], json!(64.7));
            }
            StepOutcome::Failed { .. } => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn test_unregistered_tool_reported_as_tool_not_found() {
        let executor = StepExecutor::new(ToolRegistry::new());
        let executed = executor
            .execute(&resolved(FunctionName::GenerateChart, json!({})))
            .await;
        match executed.outcome {
            StepOutcome::Failed { reason, .. } => assert_eq!(reason, "ToolNotFound"),
            StepOutcome::Success { .. } => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn test_failure_is_captured_not_propagated() {
        let executor = StepExecutor::new(create_default_registry());
        let executed = executor
            .execute(&resolved(
                FunctionName::CalculateRoi,
                json!({"revenue": 100.0, "investment": 0.0}),
            ))
            .await;
        match executed.outcome {
            StepOutcome::Failed { reason, .. } => assert_eq!(reason, "DivisionByZero"),
            StepOutcome::Success { .. } => panic!("expected failure"),
        }
    }
}
