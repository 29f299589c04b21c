//! crates/speakfree_core/src/session_store.rs
//!
//! The process-local implementation of the `SessionStore` port.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::intake::IntakeSession;
use crate::ports::{PortResult, SessionStore};

/// Keeps volatile intake state in a map for the lifetime of the process.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, IntakeSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &str) -> PortResult<Option<IntakeSession>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn save(&self, session: IntakeSession) -> PortResult<()> {
        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), session);
        Ok(())
    }

    async fn expire(&self, session_id: &str) -> PortResult<Option<IntakeSession>> {
        Ok(self.sessions.write().await.remove(session_id))
    }

    async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        idle_ttl: Duration,
        completed_ttl: Duration,
    ) -> PortResult<Vec<IntakeSession>> {
        let mut sessions = self.sessions.write().await;
        let expired: Vec<String> = sessions
            .values()
            .filter(|s| s.is_expired(now, idle_ttl, completed_ttl))
            .map(|s| s.session_id.clone())
            .collect();
        Ok(expired
            .iter()
            .filter_map(|session_id| sessions.remove(session_id))
            .collect())
    }
}
