//! Tool trait and registry
//!
//! The fixed tool library: deterministic, side-effect-free operations over
//! the embedded mock dataset. The LLM never executes anything here.

use crate::error::AgentError;
use crate::models::{ChartType, FunctionName, Metric, Period, Symbol};
use crate::namespace::NamespaceKey;
use crate::Result;
use lazy_static::lazy_static;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;

/// One quarter of line items for a symbol (figures in billions).
#[derive(Debug, Clone, Copy)]
pub struct QuarterFigures {
    pub revenue: f64,
    pub investment: f64,
    pub profit: f64,
    pub expenses: f64,
}

impl QuarterFigures {
    fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Revenue => Some(self.revenue),
            Metric::Investment => Some(self.investment),
            Metric::Profit => Some(self.profit),
            Metric::Expenses => Some(self.expenses),
            Metric::Roi => None,
        }
    }
}

macro_rules! quarter {
    ($rev:expr, $inv:expr, $prof:expr, $exp:expr) => {
        QuarterFigures {
            revenue: $rev,
            investment: $inv,
            profit: $prof,
            expenses: $exp,
        }
    };
}

lazy_static! {
    /// Illustrative dataset: {AAPL, MSFT, AMZN} × {Q1_2023..Q2_2024}.
    static ref DATASET: HashMap<(Symbol, Period), QuarterFigures> = {
        use Period::*;
        use Symbol::*;
        let mut m = HashMap::new();

        m.insert((AAPL, Q1_2023), quarter!(94.8, 25.1, 24.2, 70.6));
        m.insert((AAPL, Q2_2023), quarter!(81.8, 23.8, 19.9, 61.9));
        m.insert((AAPL, Q3_2023), quarter!(89.5, 24.3, 22.6, 66.9));
        m.insert((AAPL, Q4_2023), quarter!(119.6, 27.5, 33.9, 85.7));
        m.insert((AAPL, Q1_2024), quarter!(90.8, 24.6, 23.1, 67.7));
        m.insert((AAPL, Q2_2024), quarter!(85.3, 24.1, 21.5, 63.8));

        m.insert((MSFT, Q1_2023), quarter!(52.7, 15.3, 18.3, 34.4));
        m.insert((MSFT, Q2_2023), quarter!(56.2, 16.1, 20.1, 36.1));
        m.insert((MSFT, Q3_2023), quarter!(56.5, 16.3, 20.5, 36.0));
        m.insert((MSFT, Q4_2023), quarter!(62.0, 17.5, 21.9, 40.1));
        m.insert((MSFT, Q1_2024), quarter!(61.9, 17.2, 21.8, 40.1));
        m.insert((MSFT, Q2_2024), quarter!(64.7, 18.1, 22.5, 42.2));

        m.insert((AMZN, Q1_2023), quarter!(127.4, 42.5, 3.2, 124.2));
        m.insert((AMZN, Q2_2023), quarter!(134.4, 44.8, 6.7, 127.7));
        m.insert((AMZN, Q3_2023), quarter!(143.1, 47.2, 9.9, 133.2));
        m.insert((AMZN, Q4_2023), quarter!(169.9, 52.3, 10.6, 159.3));
        m.insert((AMZN, Q1_2024), quarter!(143.3, 46.8, 10.4, 132.9));
        m.insert((AMZN, Q2_2024), quarter!(148.2, 48.1, 13.7, 134.5));

        m
    };

    /// Published annual inflation rates the original assistant advertised.
    static ref INFLATION_RATES: HashMap<u16, f64> = {
        let mut m = HashMap::new();
        m.insert(2023, 0.045);
        m.insert(2024, 0.031);
        m.insert(2025, 0.028);
        m
    };
}

/// Figures for a symbol + period, if inside the allowed enumerations.
pub fn financial_data(symbol: Symbol, period: Period) -> Option<QuarterFigures> {
    DATASET.get(&(symbol, period)).copied()
}

/// Published annual inflation rate for a year, if known.
pub fn published_inflation_rate(year: u16) -> Option<f64> {
    INFLATION_RATES.get(&year).copied()
}

//
// ================= Tool I/O =================
//

/// Input to a tool: resolved parameters plus, for parameters that were
/// namespace-key references, the original key names (used to derive output
/// key names like `<SYM>_<PER>_ROI`).
#[derive(Debug, Clone)]
pub struct ToolInput {
    pub function_name: FunctionName,
    pub parameters: Value,
    pub references: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub data: Value,
}

/// Trait for a single tool (deterministic execution)
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> FunctionName;
    fn description(&self) -> &'static str;
    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput>;
}

/// Tool registry for looking up and executing tools
pub struct ToolRegistry {
    tools: HashMap<FunctionName, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name(), tool);
    }

    pub fn get(&self, name: FunctionName) -> Option<Arc<dyn Tool>> {
        self.tools.get(&name).cloned()
    }

    pub fn list(&self) -> Vec<FunctionName> {
        self.tools.keys().copied().collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn require_str<'a>(params: &'a Value, name: &str) -> Result<&'a str> {
    params
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::InvalidToolInput(format!("expected string '{}'", name)))
}

fn require_number(params: &Value, name: &str) -> Result<f64> {
    params
        .get(name)
        .and_then(Value::as_f64)
        .ok_or_else(|| AgentError::InvalidToolInput(format!("expected number '{}'", name)))
}

/// Resolved key lists arrive as an object mapping original key → value.
fn require_keyed_values<'a>(params: &'a Value, name: &str) -> Result<&'a Map<String, Value>> {
    params
        .get(name)
        .and_then(Value::as_object)
        .ok_or_else(|| {
            AgentError::InvalidToolInput(format!("expected resolved key map '{}'", name))
        })
}

//
// ================= get_financial_data =================
//

pub struct GetFinancialDataTool;

#[async_trait::async_trait]
impl Tool for GetFinancialDataTool {
    fn name(&self) -> FunctionName {
        FunctionName::GetFinancialData
    }

    fn description(&self) -> &'static str {
        "Fetch revenue, investment, profit and expenses for a symbol and period"
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let symbol_raw = require_str(&input.parameters, "symbol")?;
        let period_raw = require_str(&input.parameters, "period")?;

        let symbol = Symbol::from_str(symbol_raw)
            .map_err(|_| AgentError::UnknownSymbolOrPeriod(symbol_raw.to_string()))?;
        let period = Period::from_str(period_raw)
            .map_err(|_| AgentError::UnknownSymbolOrPeriod(period_raw.to_string()))?;

        let figures = financial_data(symbol, period)
            .ok_or_else(|| AgentError::UnknownSymbolOrPeriod(format!("{} {}", symbol, period)))?;

        Ok(ToolOutput {
            data: json!({
                symbol.as_str(): {
                    period.as_str(): {
                        "revenue": figures.revenue,
                        "investment": figures.investment,
                        "profit": figures.profit,
                        "expenses": figures.expenses,
                    }
                }
            }),
        })
    }
}

//
// ================= calculate_roi =================
//

pub struct CalculateRoiTool;

#[async_trait::async_trait]
impl Tool for CalculateRoiTool {
    fn name(&self) -> FunctionName {
        FunctionName::CalculateRoi
    }

    fn description(&self) -> &'static str {
        "Compute (revenue - investment) / investment"
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let revenue = require_number(&input.parameters, "revenue")?;
        let investment = require_number(&input.parameters, "investment")?;

        if investment == 0.0 {
            return Err(AgentError::DivisionByZero);
        }

        let roi = (revenue - investment) / investment;

        // Key the result under the source symbol + period when the inputs
        // were namespace references; a literal-only call lands under "ROI".
        let output_key = input
            .references
            .get("revenue")
            .or_else(|| input.references.get("investment"))
            .and_then(|key| NamespaceKey::parse(key))
            .map(|key| NamespaceKey::new(key.symbol, key.period, Metric::Roi).to_string())
            .unwrap_or_else(|| "ROI".to_string());

        Ok(ToolOutput {
            data: json!({ output_key: roi }),
        })
    }
}

//
// ================= apply_inflation_adjustment =================
//

pub struct ApplyInflationAdjustmentTool;

#[async_trait::async_trait]
impl Tool for ApplyInflationAdjustmentTool {
    fn name(&self) -> FunctionName {
        FunctionName::ApplyInflationAdjustment
    }

    fn description(&self) -> &'static str {
        "Scale values by (1 + rate), emitting the same keys with an _adjusted suffix"
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let rate = match input.parameters.get("rate").and_then(Value::as_f64) {
            Some(rate) => rate,
            None => return Err(AgentError::MissingRate),
        };

        let values = require_keyed_values(&input.parameters, "values")?;

        // Always recomputed from the unadjusted source value, so re-running
        // with the same rate overwrites rather than compounds.
        let mut adjusted = Map::new();
        for (key, value) in values {
            let original = value.as_f64().ok_or_else(|| {
                AgentError::InvalidToolInput(format!("non-numeric value for '{}'", key))
            })?;
            adjusted.insert(format!("{}_adjusted", key), json!(original * (1.0 + rate)));
        }

        Ok(ToolOutput {
            data: Value::Object(adjusted),
        })
    }
}

//
// ================= generate_chart =================
//

pub struct GenerateChartTool;

#[async_trait::async_trait]
impl Tool for GenerateChartTool {
    fn name(&self) -> FunctionName {
        FunctionName::GenerateChart
    }

    fn description(&self) -> &'static str {
        "Produce a chart descriptor over already-retrieved series"
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let chart_raw = require_str(&input.parameters, "chart_type")?;
        let chart_type = ChartType::from_str(chart_raw).map_err(|_| {
            AgentError::InvalidToolInput(format!("unsupported chart type '{}'", chart_raw))
        })?;

        let data = require_keyed_values(&input.parameters, "data")?;
        if data.is_empty() {
            return Err(AgentError::InvalidToolInput(
                "no data series for chart".to_string(),
            ));
        }

        let series = data
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(ToolOutput {
            data: json!({ "last_chart": format!("{}[{}]", chart_type, series) }),
        })
    }
}

/// Create the default registry with the four fixed tools.
pub fn create_default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(GetFinancialDataTool));
    registry.register(Arc::new(CalculateRoiTool));
    registry.register(Arc::new(ApplyInflationAdjustmentTool));
    registry.register(Arc::new(GenerateChartTool));
    registry
}
