//! Server-side sessions keyed by an opaque cookie id.
//!
//! A [`Session`] is created per request by the session middleware and
//! reaches handlers and the pipeline through request extensions. Records
//! live in a [`SessionStore`]: in memory for a single instance, or Redis
//! when `REDIS_URL` is set.
//!
//! # Security
//!
//! - Session ids are 32 bytes from `ring::rand::SystemRandom`, base64url
//! - Ids are renewed at login (session fixation defense)
//! - Store failures degrade to an empty session and never fail a request
//!   that only reads

pub mod memory;
pub mod redis_store;

pub use memory::InMemorySessionStore;
pub use redis_store::RedisSessionStore;

use crate::auth::Identity;
use crate::config::Config;
use crate::errors::GatewayError;
use crate::observability::metrics::record_session_store_error;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

/// Length of generated session ids and login states, in random bytes.
pub const TOKEN_BYTES: usize = 32;

/// Longest cookie value accepted as a session id.
const MAX_SESSION_ID_LEN: usize = 128;

/// Data kept for one browser session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Identity established by login or token exchange.
    #[serde(default)]
    pub identity: Option<Identity>,

    /// CSRF state of a pending login.
    #[serde(default)]
    pub login_state: Option<String>,

    /// Where to send the user after login.
    #[serde(default)]
    pub redirect_target: Option<String>,

    /// Exempt from the idle timeout; set for sessions created from an
    /// exchanged token pair.
    #[serde(default)]
    pub persistent: bool,
}

/// Session store errors.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session backend error: {0}")]
    Backend(String),

    #[error("Session serialization error: {0}")]
    Serialization(String),

    #[error("Random generation failed")]
    Random,
}

/// Storage backend for session records.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a record; `None` if absent or expired.
    async fn load(&self, id: &str) -> Result<Option<SessionRecord>, SessionError>;

    /// Store a record, (re)starting its idle timeout unless the record is
    /// persistent.
    async fn save(&self, id: &str, record: &SessionRecord) -> Result<(), SessionError>;

    /// Delete a record. Deleting an unknown id is not an error.
    async fn invalidate(&self, id: &str) -> Result<(), SessionError>;

    /// Check the backend is reachable.
    async fn ping(&self) -> Result<(), SessionError> {
        Ok(())
    }

    /// Backend name for logs.
    fn backend_name(&self) -> &'static str;
}

/// Build the store selected by configuration.
///
/// # Errors
///
/// Returns `SessionError::Backend` if Redis is configured but unreachable.
pub async fn store_from_config(config: &Config) -> Result<Arc<dyn SessionStore>, SessionError> {
    let ttl = Duration::from_secs(config.session_ttl_seconds);
    match &config.redis_url {
        Some(url) => Ok(Arc::new(RedisSessionStore::new(url, ttl).await?)),
        None => Ok(Arc::new(InMemorySessionStore::new(ttl))),
    }
}

/// 32 random bytes, base64url without padding.
///
/// # Errors
///
/// Returns `SessionError::Random` if the system RNG fails.
pub fn random_token() -> Result<String, SessionError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    SystemRandom::new().fill(&mut bytes).map_err(|_| {
        tracing::error!(target: "gw.session", "System random generator failed");
        SessionError::Random
    })?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Whether a cookie value can be a session id we issued.
fn is_plausible_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// What the session middleware must do with the cookie after the handler ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieAction {
    /// Issue (or replace) the cookie with this id.
    Set(String),
    /// Remove the cookie.
    Remove,
    /// Leave the cookie alone.
    Keep,
}

#[derive(Debug)]
struct SessionState {
    id: Option<String>,
    /// Id was issued during this request and must be sent to the client.
    fresh: bool,
    /// Session was invalidated and no new id has been issued since.
    invalidated: bool,
}

/// Per-request session handle.
///
/// Cheap to clone; clones share state, so a save from a spawned task is
/// seen by the session middleware.
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn SessionStore>,
    state: Arc<Mutex<SessionState>>,
}

impl Session {
    /// Handle for the id presented by the client, if any.
    ///
    /// Ids that cannot have been issued by us are ignored.
    pub fn new(store: Arc<dyn SessionStore>, id: Option<String>) -> Self {
        let id = id.filter(|id| is_plausible_id(id));
        Self {
            store,
            state: Arc::new(Mutex::new(SessionState {
                id,
                fresh: false,
                invalidated: false,
            })),
        }
    }

    /// Current session id.
    pub async fn id(&self) -> Option<String> {
        self.state.lock().await.id.clone()
    }

    /// Load the record, or an empty one if there is none.
    ///
    /// Store failures are logged and read as an empty session.
    pub async fn load(&self) -> SessionRecord {
        let Some(id) = self.id().await else {
            return SessionRecord::default();
        };

        match self.store.load(&id).await {
            Ok(record) => record.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(
                    target: "gw.session",
                    backend = self.store.backend_name(),
                    error = %e,
                    "Session load failed, treating session as empty"
                );
                record_session_store_error("load");
                SessionRecord::default()
            }
        }
    }

    /// Save the record, issuing a new id if the session has none.
    ///
    /// # Errors
    ///
    /// Returns the store error; the caller decides whether it is fatal.
    pub async fn save(&self, record: &SessionRecord) -> Result<(), SessionError> {
        let id = {
            let mut state = self.state.lock().await;
            match &state.id {
                Some(id) => id.clone(),
                None => {
                    let id = random_token()?;
                    state.id = Some(id.clone());
                    state.fresh = true;
                    state.invalidated = false;
                    id
                }
            }
        };

        self.store.save(&id, record).await.map_err(|e| {
            tracing::warn!(
                target: "gw.session",
                backend = self.store.backend_name(),
                error = %e,
                "Session save failed"
            );
            record_session_store_error("save");
            e
        })
    }

    /// Load, modify and save the record; returns the saved record.
    ///
    /// # Errors
    ///
    /// Returns the store error from the save.
    pub async fn update<F>(&self, f: F) -> Result<SessionRecord, SessionError>
    where
        F: FnOnce(&mut SessionRecord),
    {
        let mut record = self.load().await;
        f(&mut record);
        self.save(&record).await?;
        Ok(record)
    }

    /// Move to a new session id.
    ///
    /// The old record is deleted and returned; nothing is stored under the
    /// new id until the next [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Random` if no id can be generated.
    pub async fn renew(&self) -> Result<SessionRecord, SessionError> {
        let previous = self.load().await;
        let new_id = random_token()?;

        let old_id = {
            let mut state = self.state.lock().await;
            let old_id = state.id.replace(new_id);
            state.fresh = true;
            state.invalidated = false;
            old_id
        };

        if let Some(old_id) = old_id {
            self.delete(&old_id).await;
        }

        tracing::debug!(target: "gw.session", "Session id renewed");
        Ok(previous)
    }

    /// Delete the session and drop its id; the cookie will be removed.
    pub async fn invalidate(&self) {
        let old_id = {
            let mut state = self.state.lock().await;
            state.fresh = false;
            state.invalidated = true;
            state.id.take()
        };

        if let Some(old_id) = old_id {
            self.delete(&old_id).await;
        }
    }

    /// Cookie change to apply to the response.
    pub async fn cookie_action(&self) -> CookieAction {
        let state = self.state.lock().await;
        match (&state.id, state.fresh, state.invalidated) {
            (Some(id), true, _) => CookieAction::Set(id.clone()),
            (None, _, true) => CookieAction::Remove,
            _ => CookieAction::Keep,
        }
    }

    async fn delete(&self, id: &str) {
        if let Err(e) = self.store.invalidate(id).await {
            tracing::warn!(
                target: "gw.session",
                backend = self.store.backend_name(),
                error = %e,
                "Session invalidation failed"
            );
            record_session_store_error("invalidate");
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Session>().cloned().ok_or_else(|| {
            tracing::error!(target: "gw.session", "Session middleware not installed for this route");
            GatewayError::Internal
        })
    }
}
