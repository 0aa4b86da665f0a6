//! Session state persistence
//!
//! The session owns the namespace, turn history and preferences as one
//! explicitly passed value — the unit of durability between turns. Stores
//! are swappable: in-memory for tests, a JSON file per session for the CLI.

use crate::error::AgentError;
use crate::models::{TurnRecord, UserPreferences};
use crate::namespace::Namespace;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

/// Versioned per-session state. Grows monotonically within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub namespace: Namespace,
    pub turns: Vec<TurnRecord>,
    pub preferences: UserPreferences,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(preferences: UserPreferences) -> Self {
        Self {
            namespace: Namespace::new(),
            turns: Vec::new(),
            preferences,
            version: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn record_turn(&mut self, record: TurnRecord) {
        self.turns.push(record);
        self.touch();
    }

    pub fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }

    pub fn last_turn(&self) -> Option<&TurnRecord> {
        self.turns.last()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(UserPreferences::default())
    }
}

/// Trait for session persistence
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: Uuid) -> Result<Option<SessionState>>;
    async fn save(&self, session_id: Uuid, state: &SessionState) -> Result<()>;
}

/// In-memory session store for development and tests
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, SessionState>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: Uuid) -> Result<Option<SessionState>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&session_id).cloned())
    }

    async fn save(&self, session_id: Uuid, state: &SessionState) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id, state.clone());
        Ok(())
    }
}

/// One pretty-printed JSON file per session under a data directory.
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, session_id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", session_id))
    }
}

#[async_trait::async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self, session_id: Uuid) -> Result<Option<SessionState>> {
        let path = self.path_for(session_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AgentError::Persistence(e.to_string())),
        };

        // A corrupt file is treated as absent rather than fatal; the session
        // restarts from empty state.
        match serde_json::from_slice(&bytes) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Discarding unreadable session file");
                Ok(None)
            }
        }
    }

    async fn save(&self, session_id: Uuid, state: &SessionState) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AgentError::Persistence(e.to_string()))?;

        let json = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(self.path_for(session_id), json)
            .await
            .map_err(|e| AgentError::Persistence(e.to_string()))
    }
}
