//! Shared server state and per-login sessions.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use campusdrive_common::Result;
use campusdrive_drive::DriveClient;
use campusdrive_navigator::Navigator;

use crate::error::ApiError;

/// Header carrying the session id returned by `/auth/login`.
pub const SESSION_HEADER: &str = "x-session-id";

/// Sessions unused for this many minutes are dropped.
pub const DEFAULT_IDLE_MINUTES: i64 = 30;

/// One logged-in client of the service.
pub struct SessionEntry {
    pub navigator: Arc<Mutex<Navigator>>,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

impl SessionEntry {
    fn is_idle(&self, now: DateTime<Utc>, idle_timeout: Duration) -> bool {
        now - self.last_used >= idle_timeout
    }
}

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    client: Arc<DriveClient>,
    folder_name: String,
    idle_timeout: Duration,
    sessions: Arc<RwLock<HashMap<Uuid, SessionEntry>>>,
}

impl AppState {
    /// Create state serving navigators over `client` rooted at `folder_name`.
    pub fn new(client: Arc<DriveClient>, folder_name: impl Into<String>) -> Self {
        Self {
            client,
            folder_name: folder_name.into(),
            idle_timeout: Duration::minutes(DEFAULT_IDLE_MINUTES),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Drop sessions after `idle_timeout` without a request.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn client(&self) -> &Arc<DriveClient> {
        &self.client
    }

    /// Open a session with an initialized navigator.
    ///
    /// Idle sessions are swept first.
    ///
    /// # Errors
    /// - `Error::Authentication` if sign-in fails
    /// - `Error::NotFound` if the shared folder does not exist
    pub async fn open_session(&self) -> Result<(Uuid, Arc<Mutex<Navigator>>)> {
        let mut navigator = Navigator::new(self.client.clone(), self.folder_name.clone());
        navigator.initialize().await?;

        let id = Uuid::new_v4();
        let navigator = Arc::new(Mutex::new(navigator));
        let now = Utc::now();

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| !entry.is_idle(now, self.idle_timeout));
        if sessions.len() < before {
            debug!(evicted = before - sessions.len(), "Dropped idle sessions");
        }
        sessions.insert(
            id,
            SessionEntry {
                navigator: navigator.clone(),
                created_at: now,
                last_used: now,
            },
        );
        drop(sessions);
        info!(session = %id, "Session opened");
        Ok((id, navigator))
    }

    /// Close a session. Returns whether it existed.
    pub async fn close_session(&self, id: &Uuid) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            info!(session = %id, "Session closed");
        }
        removed
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Find a live session and mark it used; an idle one is removed instead.
    async fn touch(&self, id: &Uuid) -> Option<(Arc<Mutex<Navigator>>, DateTime<Utc>)> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(id)?;

        if entry.is_idle(now, self.idle_timeout) {
            sessions.remove(id);
            info!(session = %id, "Session expired");
            return None;
        }
        entry.last_used = now;
        Some((entry.navigator.clone(), entry.created_at))
    }
}

/// The caller's session, taken from the session header.
pub struct Session {
    pub id: Uuid,
    pub navigator: Arc<Mutex<Navigator>>,
    pub created_at: DateTime<Utc>,
}

impl FromRequestParts<AppState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .ok_or_else(|| ApiError::unauthorized("Not signed in; call /auth/login first"))?;

        let (navigator, created_at) = state
            .touch(&id)
            .await
            .ok_or_else(|| ApiError::unauthorized("Unknown or expired session"))?;

        Ok(Self {
            id,
            navigator,
            created_at,
        })
    }
}
