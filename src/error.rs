//! Error types for the financial query agent

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {

    // =============================
    // Per-step failures (recovered locally)
    // =============================

    #[error("Unknown symbol or period: {0}")]
    UnknownSymbolOrPeriod(String),

    #[error("Inflation rate missing for adjustment step")]
    MissingRate,

    #[error("Division by zero: investment resolved to 0")]
    DivisionByZero,

    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),

    // =============================
    // Loop-level failures (abort the turn, progress preserved)
    // =============================

    #[error("Planner unavailable: {0}")]
    PlannerUnavailable(String),

    #[error("Plan did not converge within {0} steps")]
    PlanDidNotConverge(u32),

    // =============================
    // Infrastructure
    // =============================

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("LLM error: {0}")]
    Llm(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Per-step failures are dropped or marked failed with a note and the
    /// loop continues; everything else aborts the turn.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AgentError::UnknownSymbolOrPeriod(_)
                | AgentError::MissingRate
                | AgentError::DivisionByZero
                | AgentError::UnresolvedReference(_)
                | AgentError::ToolNotFound(_)
                | AgentError::InvalidToolInput(_)
        )
    }

    /// Short machine-readable label recorded on failed steps.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::UnknownSymbolOrPeriod(_) => "UnknownSymbolOrPeriod",
            AgentError::MissingRate => "MissingRate",
            AgentError::DivisionByZero => "DivisionByZero",
            AgentError::UnresolvedReference(_) => "UnresolvedReference",
            AgentError::PlannerUnavailable(_) => "PlannerUnavailable",
            AgentError::PlanDidNotConverge(_) => "PlanDidNotConverge",
            AgentError::Persistence(_) => "PersistenceFailure",
            AgentError::ToolNotFound(_) => "ToolNotFound",
            AgentError::InvalidToolInput(_) => "InvalidToolInput",
            AgentError::Llm(_) => "LlmError",
            AgentError::Serialization(_) => "SerializationError",
            AgentError::Http(_) => "HttpError",
            AgentError::Io(_) => "IoError",
        }
    }
}
