//! Core data models for the financial query agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//
// ================= Enums =================
//

/// Stock symbols the mock data provider knows about.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Symbol {
    AAPL,
    MSFT,
    AMZN,
}

impl Symbol {
    pub const ALL: [Symbol; 3] = [Symbol::AAPL, Symbol::MSFT, Symbol::AMZN];

    pub fn as_str(&self) -> &'static str {
        match self {
            Symbol::AAPL => "AAPL",
            Symbol::MSFT => "MSFT",
            Symbol::AMZN => "AMZN",
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Symbol {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AAPL" | "APPLE" => Ok(Symbol::AAPL),
            "MSFT" | "MICROSOFT" => Ok(Symbol::MSFT),
            "AMZN" | "AMAZON" => Ok(Symbol::AMZN),
            _ => Err(()),
        }
    }
}

/// Reporting quarters covered by the mock dataset, oldest first.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Period {
    Q1_2023,
    Q2_2023,
    Q3_2023,
    Q4_2023,
    Q1_2024,
    Q2_2024,
}

impl Period {
    pub const ALL: [Period; 6] = [
        Period::Q1_2023,
        Period::Q2_2023,
        Period::Q3_2023,
        Period::Q4_2023,
        Period::Q1_2024,
        Period::Q2_2024,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Q1_2023 => "Q1_2023",
            Period::Q2_2023 => "Q2_2023",
            Period::Q3_2023 => "Q3_2023",
            Period::Q4_2023 => "Q4_2023",
            Period::Q1_2024 => "Q1_2024",
            Period::Q2_2024 => "Q2_2024",
        }
    }

    pub fn year(&self) -> u16 {
        match self {
            Period::Q1_2023 | Period::Q2_2023 | Period::Q3_2023 | Period::Q4_2023 => 2023,
            Period::Q1_2024 | Period::Q2_2024 => 2024,
        }
    }

    /// Most recent period in the allowed enumeration.
    pub fn latest() -> Period {
        Period::Q2_2024
    }

    /// The `n` most recent periods, descending chronological order.
    pub fn most_recent(n: usize) -> Vec<Period> {
        Period::ALL.iter().rev().take(n).copied().collect()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Period {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(' ', "_");
        Period::ALL
            .iter()
            .find(|p| p.as_str() == normalized)
            .copied()
            .ok_or(())
    }
}

/// Line items tracked per symbol/period, plus the derived ROI metric.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Revenue,
    Investment,
    Profit,
    Expenses,
    #[serde(rename = "ROI")]
    Roi,
}

impl Metric {
    /// The four base metrics produced by `get_financial_data`.
    pub const BASE: [Metric; 4] = [
        Metric::Revenue,
        Metric::Investment,
        Metric::Profit,
        Metric::Expenses,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Revenue => "revenue",
            Metric::Investment => "investment",
            Metric::Profit => "profit",
            Metric::Expenses => "expenses",
            Metric::Roi => "ROI",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Metric {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "revenue" => Ok(Metric::Revenue),
            "investment" => Ok(Metric::Investment),
            "profit" => Ok(Metric::Profit),
            "expenses" => Ok(Metric::Expenses),
            "roi" => Ok(Metric::Roi),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
}

impl ChartType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Bar => "bar",
            ChartType::Line => "line",
            ChartType::Pie => "pie",
        }
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChartType {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bar" => Ok(ChartType::Bar),
            "line" => Ok(ChartType::Line),
            "pie" => Ok(ChartType::Pie),
            _ => Err(()),
        }
    }
}

/// Coarse reliability tier for a plan. Declared low-to-high so the derived
/// ordering makes `min` the downgrade operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Monotonic non-increasing: a fallback event can only hold or lower it.
    pub fn downgrade_to(&mut self, ceiling: Confidence) {
        *self = (*self).min(ceiling);
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        };
        write!(f, "{}", s)
    }
}

/// Labels classifying the dominant cognitive operations behind a query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningTag {
    Arithmetic,
    Logic,
    Lookup,
    Planning,
    ToolUse,
    Comparison,
    Aggregation,
}

impl ReasoningTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningTag::Arithmetic => "arithmetic",
            ReasoningTag::Logic => "logic",
            ReasoningTag::Lookup => "lookup",
            ReasoningTag::Planning => "planning",
            ReasoningTag::ToolUse => "tool_use",
            ReasoningTag::Comparison => "comparison",
            ReasoningTag::Aggregation => "aggregation",
        }
    }
}

impl fmt::Display for ReasoningTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The fixed tool library.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FunctionName {
    GetFinancialData,
    CalculateRoi,
    ApplyInflationAdjustment,
    GenerateChart,
}

impl FunctionName {
    pub const ALL: [FunctionName; 4] = [
        FunctionName::GetFinancialData,
        FunctionName::CalculateRoi,
        FunctionName::ApplyInflationAdjustment,
        FunctionName::GenerateChart,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionName::GetFinancialData => "get_financial_data",
            FunctionName::CalculateRoi => "calculate_roi",
            FunctionName::ApplyInflationAdjustment => "apply_inflation_adjustment",
            FunctionName::GenerateChart => "generate_chart",
        }
    }
}

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FunctionName {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        FunctionName::ALL
            .iter()
            .find(|f| f.as_str() == s)
            .copied()
            .ok_or(())
    }
}

//
// ================= Preferences =================
//

/// Session-scoped defaults collected from the user.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserPreferences {
    pub preferred_symbol: Option<Symbol>,
    pub preferred_period: Option<Period>,
    pub preferred_chart: Option<ChartType>,
    pub want_inflation_adjustment: Option<bool>,
}

//
// ================= Interpretation =================
//

/// Structured reading of the user's query. Interpretation only — no function
/// planning happens here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interpretation {
    pub request_text: String,
    pub tags: Vec<ReasoningTag>,
    pub symbols: Vec<Symbol>,
    pub periods: Vec<Period>,
    pub metrics: Vec<Metric>,
    pub wants_roi: bool,
    pub wants_inflation: bool,
    pub inflation_rate: Option<f64>,
    pub wants_chart: bool,
    pub chart_type: Option<ChartType>,
    /// Assumptions made beyond the literal request (defaults filled in).
    pub notes: Vec<String>,
    pub confidence: Confidence,
}

impl Interpretation {
    /// Render the `[reasoning: tag+tag+...] <text>` form used in plan output.
    pub fn tagged_request(&self) -> String {
        let tags = self
            .tags
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join("+");
        format!("[reasoning: {}] {}", tags, self.request_text)
    }
}

//
// ================= Steps =================
//

/// One planned tool invocation. Parameter values are either literals or
/// namespace-key references.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    pub function_name: FunctionName,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StepOutcome {
    Success { result: serde_json::Value },
    Failed { reason: String, detail: String },
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success { .. })
    }
}

/// A Step after resolution and execution. Immutable once created; feeds the
/// planner as context for subsequent steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutedStep {
    pub step: Step,
    pub resolved_parameters: serde_json::Value,
    pub outcome: StepOutcome,
    pub execution_time_ms: u64,
    pub executed_at: DateTime<Utc>,
}

//
// ================= Plan output =================
//

/// One entry of the `function_calls` array in the output schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub function_name: FunctionName,
    pub parameters: serde_json::Value,
}

/// The exact output schema: `interpreted_request`, `function_calls`,
/// `confidence` — no extra keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanResult {
    pub interpreted_request: String,
    pub function_calls: Vec<FunctionCall>,
    pub confidence: Confidence,
}

impl PlanResult {
    /// Minimal valid fallback emitted when the assembled plan fails schema
    /// validation. Never returns malformed output.
    pub fn fallback(interpreted_request: String, note: &str) -> Self {
        let tagged = if interpreted_request.starts_with("[reasoning:") {
            interpreted_request
        } else {
            format!("[reasoning: lookup] {}", interpreted_request)
        };
        PlanResult {
            interpreted_request: format!("{} ({})", tagged, note),
            function_calls: Vec::new(),
            confidence: Confidence::Low,
        }
    }
}

//
// ================= Turn results =================
//

/// Loop-level failure surfaced to the caller alongside partial progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnFailure {
    PlannerUnavailable { detail: String },
    PlanDidNotConverge { step_cap: u32 },
}

/// Everything produced by one user turn. Read-only view for presentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResult {
    pub plan: PlanResult,
    pub steps: Vec<ExecutedStep>,
    pub notes: Vec<String>,
    pub failure: Option<TurnFailure>,
}

/// Per-turn record appended to session history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub turn_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub user_goal: String,
    pub plan: PlanResult,
}
