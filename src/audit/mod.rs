//! Turn audit trail
//!
//! Records every completed turn with a digest of the session namespace at
//! the time the plan was emitted, so state drift between turns can be
//! diagnosed after the fact.

use crate::models::{PlanResult, TurnResult};
use crate::namespace::Namespace;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnAudit {
    pub turn_id: Uuid,
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub user_goal: String,
    pub plan: PlanResult,
    pub executed_steps: usize,
    pub failed_steps: usize,
    /// Hex SHA-256 of the canonical namespace serialization after the turn.
    pub state_hash: String,
}

/// Deterministic digest of the namespace. BTreeMap ordering makes the JSON
/// canonical, so equal states always hash equal.
pub fn namespace_hash(namespace: &Namespace) -> String {
    let mut hasher = Sha256::new();
    if let Ok(json) = serde_json::to_vec(namespace) {
        hasher.update(&json);
    }
    hex::encode(hasher.finalize())
}

#[derive(Clone, Default)]
pub struct AuditLog {
    entries: Arc<RwLock<HashMap<Uuid, TurnAudit>>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(
        &self,
        turn_id: Uuid,
        session_id: Uuid,
        user_goal: &str,
        turn: &TurnResult,
        namespace: &Namespace,
    ) -> TurnAudit {
        let audit = TurnAudit {
            turn_id,
            session_id,
            created_at: Utc::now(),
            user_goal: user_goal.to_string(),
            plan: turn.plan.clone(),
            executed_steps: turn.steps.len(),
            failed_steps: turn
                .steps
                .iter()
                .filter(|s| !s.outcome.is_success())
                .count(),
            state_hash: namespace_hash(namespace),
        };
        let mut entries = self.entries.write().await;
        entries.insert(turn_id, audit.clone());
        audit
    }

    pub async fn get(&self, turn_id: Uuid) -> Option<TurnAudit> {
        let entries = self.entries.read().await;
        entries.get(&turn_id).cloned()
    }

    /// All audits for a session, oldest first.
    pub async fn list_for_session(&self, session_id: Uuid) -> Vec<TurnAudit> {
        let entries = self.entries.read().await;
        let mut audits: Vec<TurnAudit> = entries
            .values()
            .filter(|a| a.session_id == session_id)
            .cloned()
            .collect();
        audits.sort_by_key(|a| a.created_at);
        audits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Confidence;
    use crate::namespace::ScalarValue;

    fn turn() -> TurnResult {
        TurnResult {
            plan: PlanResult {
                interpreted_request: "[reasoning: lookup] revenue for AAPL".into(),
                function_calls: vec![],
                confidence: Confidence::Low,
            },
            steps: vec![],
            notes: vec![],
            failure: None,
        }
    }

    #[test]
    fn test_equal_states_hash_equal() {
        let mut a = Namespace::new();
        let mut b = Namespace::new();
        a.insert("AAPL_Q1_2024_revenue", ScalarValue::Number(90.8));
        a.insert("AAPL_Q1_2024_profit", ScalarValue::Number(23.6));
        // Insertion order differs; canonical serialization does not.
        b.insert("AAPL_Q1_2024_profit", ScalarValue::Number(23.6));
        b.insert("AAPL_Q1_2024_revenue", ScalarValue::Number(90.8));
        assert_eq!(namespace_hash(&a), namespace_hash(&b));
        assert_ne!(namespace_hash(&a), namespace_hash(&Namespace::new()));
    }

    #[tokio::test]
    async fn test_record_and_list() {
        let log = AuditLog::new();
        let session_id = Uuid::new_v4();
        let ns = Namespace::new();

        let first = log
            .record(Uuid::new_v4(), session_id, "revenue for AAPL", &turn(), &ns)
            .await;
        log.record(Uuid::new_v4(), Uuid::new_v4(), "other session", &turn(), &ns)
            .await;

        assert!(log.get(first.turn_id).await.is_some());
        let listed = log.list_for_session(session_id).await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].user_goal, "revenue for AAPL");
    }
}
