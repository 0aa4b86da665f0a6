//! Planner trait and implementations
//!
//! The planner is asked once per loop iteration for exactly one next step,
//! given the interpreted request, the full namespace, and the executed-step
//! history. It respects dependency order, never duplicates work, never
//! invents an inflation rate, and reports completion once every implied
//! entity has a namespace key or an explanatory note.

use crate::models::{
    ExecutedStep, FunctionName, Interpretation, Metric, Period, Step, Symbol, UserPreferences,
};
use crate::namespace::{Namespace, NamespaceKey};
use crate::Result;
use async_trait::async_trait;
use serde_json::json;

pub mod gemini;
pub use gemini::GeminiPlanner;

/// Everything the planner may look at when proposing the next step.
pub struct PlanningContext<'a> {
    pub interpretation: &'a Interpretation,
    pub preferences: &'a UserPreferences,
    pub namespace: &'a Namespace,
    pub history: &'a [ExecutedStep],
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlannerDecision {
    Next(Step),
    Complete,
}

/// Trait for one-step-at-a-time plan generation. Implementations may be a
/// rules engine, an LLM round-trip, or a hybrid; the contract
/// (dependency-respecting, non-duplicating) is what matters.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn propose_next_step(&self, ctx: &PlanningContext<'_>) -> Result<PlannerDecision>;
}

/// Deterministic rules planner. Keeps the system functional without an LLM
/// and serves as the reference for the planning contract.
pub struct RulePlanner;

impl RulePlanner {
    /// A step is never re-proposed once an identical invocation has been
    /// executed, whatever its outcome. Dedupe keys on the resolved parameter
    /// set as well as the declared one, so a re-spelling of an executed step
    /// is treated as satisfied.
    fn already_attempted(history: &[ExecutedStep], step: &Step) -> bool {
        history.iter().any(|executed| {
            executed.step == *step
                || (executed.step.function_name == step.function_name
                    && executed.resolved_parameters == step.parameters)
        })
    }

    fn retrieval_step(symbol: Symbol, period: Period) -> Step {
        Step {
            function_name: FunctionName::GetFinancialData,
            parameters: json!({
                "symbol": symbol.as_str(),
                "period": period.as_str(),
            }),
        }
    }

    /// The metrics this request ultimately cares about, per target.
    fn requested_metrics(interpretation: &Interpretation) -> Vec<Metric> {
        if interpretation.wants_roi {
            vec![Metric::Roi]
        } else if interpretation.metrics.is_empty() {
            vec![Metric::Revenue]
        } else {
            interpretation.metrics.clone()
        }
    }
}

#[async_trait]
impl Planner for RulePlanner {
    async fn propose_next_step(&self, ctx: &PlanningContext<'_>) -> Result<PlannerDecision> {
        let interp = ctx.interpretation;
        let ns = ctx.namespace;

        // Nothing to plan without a symbol; the interpretation note explains.
        if interp.symbols.is_empty() {
            return Ok(PlannerDecision::Complete);
        }

        let targets: Vec<(Symbol, Period)> = interp
            .symbols
            .iter()
            .flat_map(|s| interp.periods.iter().map(move |p| (*s, *p)))
            .collect();

        // 1. Retrieval first: every downstream step depends on the base
        //    metrics existing in the namespace.
        for &(symbol, period) in &targets {
            let have_base = Metric::BASE
                .iter()
                .all(|m| ns.contains(&NamespaceKey::new(symbol, period, *m).to_string()));
            if have_base {
                continue;
            }
            let step = Self::retrieval_step(symbol, period);
            if !Self::already_attempted(ctx.history, &step) {
                return Ok(PlannerDecision::Next(step));
            }
        }

        // 2. ROI per target, once revenue and investment exist.
        if interp.wants_roi {
            for &(symbol, period) in &targets {
                let roi_key = NamespaceKey::new(symbol, period, Metric::Roi).to_string();
                if ns.contains(&roi_key) {
                    continue;
                }
                let revenue = NamespaceKey::new(symbol, period, Metric::Revenue).to_string();
                let investment =
                    NamespaceKey::new(symbol, period, Metric::Investment).to_string();
                if !ns.contains(&revenue) || !ns.contains(&investment) {
                    // Retrieval was attempted and failed; the dependency is
                    // dropped rather than retried forever.
                    continue;
                }
                let step = Step {
                    function_name: FunctionName::CalculateRoi,
                    parameters: json!({
                        "revenue": revenue,
                        "investment": investment,
                    }),
                };
                if !Self::already_attempted(ctx.history, &step) {
                    return Ok(PlannerDecision::Next(step));
                }
            }
        }

        // 3. Inflation adjustment only with a concrete rate; a rate is never
        //    invented, and without one the step is simply not planned.
        if interp.wants_inflation {
            if let Some(rate) = interp.inflation_rate {
                let metrics = Self::requested_metrics(interp);
                let pending: Vec<String> = targets
                    .iter()
                    .flat_map(|&(symbol, period)| {
                        metrics.iter().filter_map(move |&metric| {
                            let key = NamespaceKey::new(symbol, period, metric).to_string();
                            let adjusted = format!("{}_adjusted", key);
                            (ns.contains(&key) && !ns.contains(&adjusted)).then_some(key)
                        })
                    })
                    .collect();

                if !pending.is_empty() {
                    let step = Step {
                        function_name: FunctionName::ApplyInflationAdjustment,
                        parameters: json!({
                            "values": pending,
                            "rate": rate,
                        }),
                    };
                    if !Self::already_attempted(ctx.history, &step) {
                        return Ok(PlannerDecision::Next(step));
                    }
                }
            }
        }

        // 4. Chart last, and only when it can be satisfied. Visualization is
        //    never allowed to block completion.
        if interp.wants_chart {
            if let Some(chart_type) = interp.chart_type {
                let adjusted_wanted = interp.wants_inflation && interp.inflation_rate.is_some();
                let metrics = Self::requested_metrics(interp);
                let series: Vec<String> = targets
                    .iter()
                    .flat_map(|&(symbol, period)| {
                        metrics.iter().filter_map(move |&metric| {
                            let base = NamespaceKey::new(symbol, period, metric).to_string();
                            let adjusted = format!("{}_adjusted", base);
                            if adjusted_wanted && ns.contains(&adjusted) {
                                Some(adjusted)
                            } else if ns.contains(&base) {
                                Some(base)
                            } else {
                                None
                            }
                        })
                    })
                    .collect();

                if !series.is_empty() {
                    let step = Step {
                        function_name: FunctionName::GenerateChart,
                        parameters: json!({
                            "data": series,
                            "chart_type": chart_type.as_str(),
                        }),
                    };
                    if !Self::already_attempted(ctx.history, &step) {
                        return Ok(PlannerDecision::Next(step));
                    }
                }
            }
        }

        Ok(PlannerDecision::Complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Confidence, ReasoningTag, StepOutcome};
    use chrono::Utc;

    fn interpretation() -> Interpretation {
        Interpretation {
            request_text: "Compare ROI for AAPL last two quarters".into(),
            tags: vec![ReasoningTag::Comparison, ReasoningTag::Arithmetic],
            symbols: vec![Symbol::AAPL],
            periods: vec![Period::Q2_2024, Period::Q1_2024],
            metrics: vec![],
            wants_roi: true,
            wants_inflation: false,
            inflation_rate: None,
            wants_chart: false,
            chart_type: None,
            notes: vec![],
            confidence: Confidence::Medium,
        }
    }

    fn executed(step: Step, result: serde_json::Value) -> ExecutedStep {
        ExecutedStep {
            resolved_parameters: step.parameters.clone(),
            step,
            outcome: StepOutcome::Success { result },
            execution_time_ms: 0,
            executed_at: Utc::now(),
        }
    }

    async fn propose(
        interp: &Interpretation,
        ns: &Namespace,
        history: &[ExecutedStep],
    ) -> PlannerDecision {
        let prefs = UserPreferences::default();
        RulePlanner
            .propose_next_step(&PlanningContext {
                interpretation: interp,
                preferences: &prefs,
                namespace: ns,
                history,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_retrieval_precedes_roi() {
        let interp = interpretation();
        let decision = propose(&interp, &Namespace::new(), &[]).await;
        match decision {
            PlannerDecision::Next(step) => {
                assert_eq!(step.function_name, FunctionName::GetFinancialData);
                assert_eq!(step.parameters["period"], "Q2_2024");
            }
            PlannerDecision::Complete => panic!("expected a retrieval step"),
        }
    }

    #[tokio::test]
    async fn test_roi_proposed_once_data_exists() {
        let interp = interpretation();
        let mut ns = Namespace::new();
        for period in ["Q1_2024", "Q2_2024"] {
            ns.merge(&serde_json::json!({
                "AAPL": { period: {
                    "revenue": 90.0, "investment": 24.0, "profit": 23.0, "expenses": 67.0,
                }}
            }));
        }
        let history = vec![
            executed(RulePlanner::retrieval_step(Symbol::AAPL, Period::Q2_2024), serde_json::json!({})),
            executed(RulePlanner::retrieval_step(Symbol::AAPL, Period::Q1_2024), serde_json::json!({})),
        ];
        let decision = propose(&interp, &ns, &history).await;
        match decision {
            PlannerDecision::Next(step) => {
                assert_eq!(step.function_name, FunctionName::CalculateRoi);
                assert_eq!(step.parameters["revenue"], "AAPL_Q2_2024_revenue");
            }
            PlannerDecision::Complete => panic!("expected a ROI step"),
        }
    }

    #[tokio::test]
    async fn test_no_duplicate_retrieval_after_failure() {
        let interp = interpretation();
        let step = RulePlanner::retrieval_step(Symbol::AAPL, Period::Q2_2024);
        let failed = ExecutedStep {
            resolved_parameters: step.parameters.clone(),
            step: step.clone(),
            outcome: StepOutcome::Failed {
                reason: "UnknownSymbolOrPeriod".into(),
                detail: "test".into(),
            },
            execution_time_ms: 0,
            executed_at: Utc::now(),
        };
        let decision = propose(&interp, &Namespace::new(), &[failed]).await;
        match decision {
            PlannerDecision::Next(step) => {
                // Moves on to the next unmet dependency instead of retrying.
                assert_eq!(step.parameters["period"], "Q1_2024");
            }
            PlannerDecision::Complete => panic!("expected the other retrieval"),
        }
    }

    #[tokio::test]
    async fn test_no_adjustment_step_without_rate() {
        let mut interp = interpretation();
        interp.wants_inflation = true;
        interp.inflation_rate = None;
        let mut ns = Namespace::new();
        for period in ["Q1_2024", "Q2_2024"] {
            ns.merge(&serde_json::json!({
                "AAPL": { period: {
                    "revenue": 90.0, "investment": 24.0, "profit": 23.0, "expenses": 67.0,
                }}
            }));
            let roi_key = format!("AAPL_{}_ROI", period);
            ns.merge(&serde_json::json!({ roi_key: 2.7 }));
        }
        let decision = propose(&interp, &ns, &[]).await;
        assert_eq!(decision, PlannerDecision::Complete);
    }

    #[tokio::test]
    async fn test_adjustment_targets_roi_keys() {
        let mut interp = interpretation();
        interp.wants_inflation = true;
        interp.inflation_rate = Some(0.031);
        let mut ns = Namespace::new();
        for period in ["Q1_2024", "Q2_2024"] {
            ns.merge(&serde_json::json!({
                "AAPL": { period: {
                    "revenue": 90.0, "investment": 24.0, "profit": 23.0, "expenses": 67.0,
                }}
            }));
            let roi_key = format!("AAPL_{}_ROI", period);
            ns.merge(&serde_json::json!({ roi_key: 2.7 }));
        }
        let decision = propose(&interp, &ns, &[]).await;
        match decision {
            PlannerDecision::Next(step) => {
                assert_eq!(step.function_name, FunctionName::ApplyInflationAdjustment);
                let values = step.parameters["values"].as_array().unwrap();
                assert!(values.contains(&serde_json::json!("AAPL_Q2_2024_ROI")));
                assert_eq!(step.parameters["rate"], 0.031);
            }
            PlannerDecision::Complete => panic!("expected an adjustment step"),
        }
    }

    #[tokio::test]
    async fn test_chart_omitted_without_type() {
        let mut interp = interpretation();
        interp.wants_roi = false;
        interp.wants_chart = true;
        interp.chart_type = None;
        let mut ns = Namespace::new();
        ns.merge(&serde_json::json!({
            "AAPL": { "Q1_2024": {
                "revenue": 90.0, "investment": 24.0, "profit": 23.0, "expenses": 67.0,
            }, "Q2_2024": {
                "revenue": 85.0, "investment": 24.0, "profit": 21.0, "expenses": 63.0,
            }}
        }));
        let decision = propose(&interp, &ns, &[]).await;
        assert_eq!(decision, PlannerDecision::Complete);
    }

    #[tokio::test]
    async fn test_complete_without_symbol() {
        let mut interp = interpretation();
        interp.symbols = vec![];
        let decision = propose(&interp, &Namespace::new(), &[]).await;
        assert_eq!(decision, PlannerDecision::Complete);
    }
}
