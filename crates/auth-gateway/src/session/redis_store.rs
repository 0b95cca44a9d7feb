//! Redis-backed session store.
//!
//! # Key Patterns
//!
//! - `session:{id}` - JSON-encoded [`SessionRecord`], expiring after the
//!   session idle timeout; persistent records carry no expiry
//!
//! # Connection Pattern
//!
//! The `MultiplexedConnection` is cheap to clone and safe to use
//! concurrently; each operation clones it instead of locking.

use super::{SessionError, SessionRecord, SessionStore};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tracing::instrument;

const KEY_PREFIX: &str = "session:";

/// Session store in Redis with a sliding expiry.
#[derive(Clone)]
pub struct RedisSessionStore {
    connection: MultiplexedConnection,
    ttl_seconds: u64,
}

impl RedisSessionStore {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Backend` if the URL is invalid or the
    /// connection fails.
    pub async fn new(redis_url: &str, ttl: Duration) -> Result<Self, SessionError> {
        let client = Client::open(redis_url).map_err(|e| {
            // The URL may carry credentials; never log it
            tracing::error!(target: "gw.session", error = %e, "Failed to open Redis client");
            SessionError::Backend(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                tracing::error!(target: "gw.session", error = %e, "Failed to connect to Redis");
                SessionError::Backend(format!("Failed to connect to Redis: {e}"))
            })?;

        tracing::info!(target: "gw.session", "Connected to Redis session store");

        Ok(Self {
            connection,
            ttl_seconds: ttl.as_secs().max(1),
        })
    }

    fn key(id: &str) -> String {
        format!("{KEY_PREFIX}{id}")
    }
}

fn backend_error(operation: &str, e: &redis::RedisError) -> SessionError {
    tracing::warn!(target: "gw.session", operation, error = %e, "Redis command failed");
    SessionError::Backend(format!("{operation} failed: {e}"))
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    #[instrument(skip_all)]
    async fn load(&self, id: &str) -> Result<Option<SessionRecord>, SessionError> {
        let mut conn = self.connection.clone();
        let key = Self::key(id);

        let value: Option<String> = conn
            .get(&key)
            .await
            .map_err(|e| backend_error("GET", &e))?;

        let Some(value) = value else {
            return Ok(None);
        };

        let record: SessionRecord =
            serde_json::from_str(&value).map_err(|e| SessionError::Serialization(e.to_string()))?;

        // Sliding expiry
        if !record.persistent {
            let _: bool = conn
                .expire(&key, i64::try_from(self.ttl_seconds).unwrap_or(i64::MAX))
                .await
                .map_err(|e| backend_error("EXPIRE", &e))?;
        }

        Ok(Some(record))
    }

    #[instrument(skip_all)]
    async fn save(&self, id: &str, record: &SessionRecord) -> Result<(), SessionError> {
        let mut conn = self.connection.clone();
        let value =
            serde_json::to_string(record).map_err(|e| SessionError::Serialization(e.to_string()))?;

        // A plain SET also clears any expiry left on the key
        let result: Result<(), _> = if record.persistent {
            conn.set(Self::key(id), value).await
        } else {
            conn.set_ex(Self::key(id), value, self.ttl_seconds).await
        };
        result.map_err(|e| backend_error("SET", &e))?;

        Ok(())
    }

    #[instrument(skip_all)]
    async fn invalidate(&self, id: &str) -> Result<(), SessionError> {
        let mut conn = self.connection.clone();

        let _: i64 = conn
            .del(Self::key(id))
            .await
            .map_err(|e| backend_error("DEL", &e))?;

        Ok(())
    }

    async fn ping(&self) -> Result<(), SessionError> {
        let mut conn = self.connection.clone();

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| backend_error("PING", &e))?;

        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
