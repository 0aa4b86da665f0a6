//! Financial Query Agent
//!
//! Turns a natural-language finance question into a validated,
//! schema-constrained plan of function calls:
//! - Interprets the request into symbols, periods, metrics and wishes
//! - Plans one step at a time against a shared reference namespace
//! - Resolves parameter references before deterministic tool execution
//! - Recovers per-step failures with notes and confidence downgrades
//! - Persists session state and keeps an auditable turn trail
//!
//! UNIFIED LOOP:
//! INPUT → INTERPRET → PROPOSE → RESOLVE → EXECUTE → MERGE → COMPLETE

pub mod agent;
pub mod api;
pub mod audit;
pub mod classifier;
pub mod error;
pub mod execution;
pub mod gemini;
pub mod interpreter;
pub mod models;
pub mod namespace;
pub mod planner;
pub mod resolver;
pub mod state;
pub mod tools;
pub mod validation;

pub use error::{AgentError, Result};

// Re-export common types
pub use models::*;
pub use namespace::{Namespace, NamespaceKey, ScalarValue};
