//! Agent orchestrator
//!
//! Drives one user turn end to end: load session, interpret, then loop
//! propose → resolve → execute → merge until the planner reports completion
//! or the step cap trips. Per-step failures are recovered locally with a
//! note and a confidence downgrade; only infrastructure faults abort.

use crate::audit::AuditLog;
use crate::error::AgentError;
use crate::execution::StepExecutor;
use crate::interpreter::{Interpreter, RuleInterpreter};
use crate::models::{
    Confidence, ExecutedStep, FunctionCall, PlanResult, StepOutcome, TurnFailure, TurnRecord,
    TurnResult, UserPreferences,
};
use crate::planner::{Planner, PlannerDecision, PlanningContext};
use crate::resolver::{FuzzyResolver, ParameterResolver, ResolvedStep};
use crate::state::{SessionState, SessionStore};
use crate::tools::create_default_registry;
use crate::validation::PlanValidator;
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Hard cap on planner iterations per turn.
pub const MAX_STEPS_PER_TURN: u32 = 16;

pub struct Orchestrator {
    interpreter: Box<dyn Interpreter>,
    planner: Box<dyn Planner>,
    resolver: ParameterResolver,
    executor: StepExecutor,
    store: Arc<dyn SessionStore>,
    validator: PlanValidator,
    audit: AuditLog,
}

impl Orchestrator {
    pub fn new(planner: Box<dyn Planner>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            interpreter: Box::new(RuleInterpreter),
            planner,
            resolver: ParameterResolver::new(Box::new(FuzzyResolver)),
            executor: StepExecutor::new(create_default_registry()),
            store,
            validator: PlanValidator::new(),
            audit: AuditLog::new(),
        }
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    /// Run one turn against the session. Loop-level failures are returned in
    /// `TurnResult::failure` with partial progress intact; only
    /// infrastructure faults produce an `Err`.
    pub async fn run_turn(
        &self,
        session_id: Uuid,
        query: &str,
        prefs: Option<UserPreferences>,
    ) -> Result<TurnResult> {
        let mut state = self.load_session(session_id).await;
        if let Some(prefs) = prefs {
            apply_preferences(&mut state.preferences, prefs);
        }

        let interpretation = self
            .interpreter
            .interpret(query, &state.preferences, &state.namespace)
            .await?;
        info!(
            session = %session_id,
            symbols = ?interpretation.symbols,
            periods = ?interpretation.periods,
            confidence = %interpretation.confidence,
            "Interpreted query"
        );

        let mut notes = interpretation.notes.clone();
        let mut confidence = interpretation.confidence;
        let mut steps: Vec<ExecutedStep> = Vec::new();
        let mut failure: Option<TurnFailure> = None;
        let mut converged = false;

        if interpretation.wants_inflation && interpretation.inflation_rate.is_none() {
            notes.push("no inflation rate available; adjustment step omitted".to_string());
            confidence.downgrade_to(Confidence::Medium);
        }

        for iteration in 0..MAX_STEPS_PER_TURN {
            let ctx = PlanningContext {
                interpretation: &interpretation,
                preferences: &state.preferences,
                namespace: &state.namespace,
                history: &steps,
            };

            let decision = match self.propose_with_retry(&ctx).await {
                Ok(decision) => decision,
                Err(e) => {
                    warn!(error = %e, "Planner gave up; ending turn with partial progress");
                    notes.push(format!("planning aborted: {}", e));
                    confidence.downgrade_to(Confidence::Low);
                    failure = Some(TurnFailure::PlannerUnavailable {
                        detail: e.to_string(),
                    });
                    break;
                }
            };

            let step = match decision {
                PlannerDecision::Complete => {
                    info!(iterations = iteration, "Plan converged");
                    converged = true;
                    break;
                }
                PlannerDecision::Next(step) => step,
            };

            let executed = match self.resolver.resolve_step(&step, &state.namespace) {
                Ok(resolved) => {
                    // Dedupe keys on the resolved invocation: a re-spelling
                    // of an executed step is satisfied, not run again.
                    if already_satisfied(&steps, &resolved) {
                        debug!(
                            tool = %resolved.step.function_name,
                            "Skipping duplicate of an already-executed step"
                        );
                        continue;
                    }
                    self.executor.execute(&resolved).await
                }
                Err(e) if e.is_recoverable() => ExecutedStep {
                    resolved_parameters: step.parameters.clone(),
                    step,
                    outcome: StepOutcome::Failed {
                        reason: e.kind().to_string(),
                        detail: e.to_string(),
                    },
                    execution_time_ms: 0,
                    executed_at: Utc::now(),
                },
                Err(e) => return Err(e),
            };

            match &executed.outcome {
                StepOutcome::Success { result } => {
                    state.namespace.merge(result);
                }
                StepOutcome::Failed { reason, detail } => {
                    notes.push(format!(
                        "dropped step {}: {}",
                        executed.step.function_name, detail
                    ));
                    confidence.downgrade_to(downgrade_for(reason));
                }
            }
            steps.push(executed);
            state.touch();
            self.persist(session_id, &state, &mut notes).await;
        }

        if !converged && failure.is_none() {
            // The cap may fall exactly on the last needed step; the planner
            // gets one final chance to declare completion.
            let ctx = PlanningContext {
                interpretation: &interpretation,
                preferences: &state.preferences,
                namespace: &state.namespace,
                history: &steps,
            };
            if matches!(
                self.propose_with_retry(&ctx).await,
                Ok(PlannerDecision::Complete)
            ) {
                info!(iterations = MAX_STEPS_PER_TURN, "Plan converged");
                converged = true;
            }
        }

        if !converged && failure.is_none() {
            let err = AgentError::PlanDidNotConverge(MAX_STEPS_PER_TURN);
            warn!(cap = MAX_STEPS_PER_TURN, "Plan did not converge");
            notes.push(format!("planning aborted: {}", err));
            confidence.downgrade_to(Confidence::Low);
            failure = Some(TurnFailure::PlanDidNotConverge {
                step_cap: MAX_STEPS_PER_TURN,
            });
        }

        let plan = self.assemble_plan(&interpretation.tagged_request(), &steps, confidence);
        let turn = TurnResult {
            plan: plan.clone(),
            steps,
            notes,
            failure,
        };

        let turn_id = Uuid::new_v4();
        state.record_turn(TurnRecord {
            turn_id,
            created_at: Utc::now(),
            user_goal: query.to_string(),
            plan,
        });
        let mut post_notes = Vec::new();
        self.persist(session_id, &state, &mut post_notes).await;
        self.audit
            .record(turn_id, session_id, query, &turn, &state.namespace)
            .await;

        Ok(turn)
    }

    /// A failed load is treated as an empty session, not a fatal error.
    async fn load_session(&self, session_id: Uuid) -> SessionState {
        match self.store.load(session_id).await {
            Ok(Some(state)) => state,
            Ok(None) => SessionState::default(),
            Err(e) => {
                warn!(session = %session_id, error = %e, "Session load failed; starting empty");
                SessionState::default()
            }
        }
    }

    /// One retry on planner failure, then give up.
    async fn propose_with_retry(&self, ctx: &PlanningContext<'_>) -> Result<PlannerDecision> {
        match self.planner.propose_next_step(ctx).await {
            Ok(decision) => Ok(decision),
            Err(first) => {
                warn!(error = %first, "Planner failed; retrying once");
                self.planner.propose_next_step(ctx).await
            }
        }
    }

    /// Persistence is warn-only: the in-memory turn keeps going.
    async fn persist(&self, session_id: Uuid, state: &SessionState, notes: &mut Vec<String>) {
        if let Err(e) = self.store.save(session_id, state).await {
            warn!(session = %session_id, error = %e, "Failed to persist session");
            if !notes.iter().any(|n| n.starts_with("session not persisted")) {
                notes.push(format!("session not persisted: {}", e));
            }
        }
    }

    /// The emitted plan lists only the steps that succeeded, carrying their
    /// original reference-bearing parameters.
    fn assemble_plan(
        &self,
        tagged_request: &str,
        steps: &[ExecutedStep],
        confidence: Confidence,
    ) -> PlanResult {
        let function_calls: Vec<FunctionCall> = steps
            .iter()
            .filter_map(|s| match &s.outcome {
                StepOutcome::Success { result } => {
                    let mut parameters = s.step.parameters.clone();
                    if let Some(object) = parameters.as_object_mut() {
                        object.insert(
                            "output_keys".to_string(),
                            serde_json::json!(produced_keys(result)),
                        );
                    }
                    Some(FunctionCall {
                        function_name: s.step.function_name,
                        parameters,
                    })
                }
                StepOutcome::Failed { .. } => None,
            })
            .collect();

        let plan = PlanResult {
            interpreted_request: tagged_request.to_string(),
            function_calls,
            confidence,
        };

        let validation = self.validator.validate(&plan);
        if validation.is_valid {
            plan
        } else {
            PlanResult::fallback(
                tagged_request.to_string(),
                &format!("plan failed validation: {}", validation.issues.join("; ")),
            )
        }
    }
}

/// An invocation whose resolved parameters match an already-successful step
/// in this turn is satisfied by that step's output.
fn already_satisfied(steps: &[ExecutedStep], resolved: &ResolvedStep) -> bool {
    steps.iter().any(|s| {
        s.step.function_name == resolved.step.function_name
            && s.resolved_parameters == resolved.parameters
            && s.outcome.is_success()
    })
}

/// The namespace keys a tool result contributes once flattened.
fn produced_keys(result: &serde_json::Value) -> Vec<String> {
    let mut scratch = crate::namespace::Namespace::new();
    scratch.merge(result);
    scratch.keys().map(str::to_string).collect()
}

fn apply_preferences(target: &mut UserPreferences, update: UserPreferences) {
    if update.preferred_symbol.is_some() {
        target.preferred_symbol = update.preferred_symbol;
    }
    if update.preferred_period.is_some() {
        target.preferred_period = update.preferred_period;
    }
    if update.preferred_chart.is_some() {
        target.preferred_chart = update.preferred_chart;
    }
    if update.want_inflation_adjustment.is_some() {
        target.want_inflation_adjustment = update.want_inflation_adjustment;
    }
}

/// Confidence ceiling per failure kind. A dead reference means the plan is
/// on shaky ground; data-shaped failures are survivable assumptions.
fn downgrade_for(reason: &str) -> Confidence {
    match reason {
        "UnresolvedReference" => Confidence::Medium,
        "UnknownSymbolOrPeriod" => Confidence::Medium,
        "DivisionByZero" => Confidence::Medium,
        "MissingRate" => Confidence::Medium,
        _ => Confidence::Low,
    }
}
