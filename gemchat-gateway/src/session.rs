//! In-memory session store.
//!
//! Maps a session id to its conversation handle, creation time and turn
//! count. Sessions live until a cleanup sweep removes them; nothing is
//! persisted.
//!
//! The map is guarded by a `RwLock`, and each session serializes its own
//! turns through an async mutex around the conversation, so a remote call and
//! the turn-count increment happen as one unit per session.

use crate::provider::{Conversation, ModelClient, TurnPart};
use chrono::{DateTime, Utc};
use gemchat_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;

/// Active-session snapshots are logged every this many turns.
const SNAPSHOT_EVERY: u64 = 5;

/// Server-held conversation state for one session id.
#[derive(Debug)]
pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    turn_count: AtomicU64,
    conversation: Mutex<Conversation>,
}

impl Session {
    fn new(id: String, conversation: Conversation) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            turn_count: AtomicU64::new(0),
            conversation: Mutex::new(conversation),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Number of successful turns.
    pub fn turn_count(&self) -> u64 {
        self.turn_count.load(Ordering::SeqCst)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id.clone(),
            message_count: self.turn_count(),
            created_at: self.created_at.to_rfc3339(),
        }
    }
}

/// Listing entry for a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: String,
    pub message_count: u64,
    pub created_at: String,
}

/// Process-wide session map.
pub struct SessionStore {
    client: Arc<dyn ModelClient>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionStore {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self {
            client,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Return the session for `id`, creating it if it does not exist.
    pub fn get_or_create(&self, id: &str) -> Arc<Session> {
        if let Some(session) = self.get(id) {
            tracing::debug!(
                session_id = %id,
                message_count = session.turn_count(),
                "Using existing session"
            );
            return session;
        }

        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        // Another request may have created it between the two locks
        let session = sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                tracing::info!(session_id = %id, "Created new session");
                Arc::new(Session::new(id.to_string(), self.client.start_conversation()))
            })
            .clone();

        session
    }

    /// Create a session under a freshly generated id.
    pub fn create_new(&self) -> Arc<Session> {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let id = loop {
            let candidate = generate_session_id();
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };

        let session = Arc::new(Session::new(id.clone(), self.client.start_conversation()));
        sessions.insert(id.clone(), Arc::clone(&session));

        tracing::info!(session_id = %id, "Created new chat session");
        session
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Summaries of every session, newest first.
    pub fn list(&self) -> Vec<SessionSummary> {
        let mut sessions: Vec<Arc<Session>> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions.iter().map(|s| s.summary()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove sessions older than `max_age`. Returns how many were removed.
    ///
    /// A `max_age` reaching past the earliest representable time removes
    /// nothing.
    pub fn cleanup(&self, max_age: chrono::Duration) -> usize {
        match Utc::now().checked_sub_signed(max_age) {
            Some(cutoff) => self.cleanup_before(cutoff),
            None => {
                tracing::warn!(
                    max_age_hours = max_age.num_hours(),
                    "Session timeout out of range, nothing cleaned up"
                );
                0
            }
        }
    }

    /// Remove sessions created strictly before `cutoff`.
    pub fn cleanup_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let before = sessions.len();
        sessions.retain(|_, session| session.created_at >= cutoff);
        let removed = before - sessions.len();

        tracing::info!(
            cleaned_up = removed,
            remaining = sessions.len(),
            cutoff = %cutoff.to_rfc3339(),
            "Cleaned up old sessions"
        );
        removed
    }

    /// Run one turn on `session`.
    ///
    /// Turns on the same session are serialized; the turn count is bumped only
    /// when the model call succeeds.
    pub async fn send_turn(&self, session: &Session, parts: Vec<TurnPart>) -> Result<String> {
        let mut conversation = session.conversation.lock().await;

        let reply = self
            .client
            .send_turn(&mut conversation, parts)
            .await
            .map_err(|e| Error::RemoteCallFailed(e.message))?;

        let count = session.turn_count.fetch_add(1, Ordering::SeqCst) + 1;
        drop(conversation);

        if count % SNAPSHOT_EVERY == 0 {
            self.log_snapshot();
        }

        Ok(reply)
    }

    /// Log every active session.
    pub fn log_snapshot(&self) {
        let sessions = self.list();
        tracing::info!(active_sessions = sessions.len(), "Active sessions");
        for s in &sessions {
            tracing::info!(
                session_id = %s.session_id,
                message_count = s.message_count,
                created_at = %s.created_at,
                "Session"
            );
        }
    }
}

/// Generate an id of the form `session-<unix millis>-<8 hex>`.
pub fn generate_session_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("session-{}-{}", Utc::now().timestamp_millis(), &suffix[..8])
}

/// Sweep expired sessions every `interval` until the store is dropped.
pub fn spawn_cleanup_task(
    store: Arc<SessionStore>,
    max_age: chrono::Duration,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    let store = Arc::downgrade(&store);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // first tick fires immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(store) = store.upgrade() else {
                break;
            };
            store.cleanup(max_age);
        }
    })
}
