//! In-process session store.

use super::{SessionError, SessionRecord, SessionStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

struct Entry {
    record: SessionRecord,
    last_access: Instant,
}

impl Entry {
    fn is_expired(&self, idle_timeout: Duration) -> bool {
        !self.record.persistent && self.last_access.elapsed() >= idle_timeout
    }
}

struct Entries {
    map: HashMap<String, Entry>,
    last_sweep: Instant,
}

/// Session store held in memory with an idle timeout.
///
/// Each load or save restarts the timeout; persistent records never
/// expire. Expired entries are dropped on access, and a save sweeps the
/// map at most once per idle timeout.
pub struct InMemorySessionStore {
    entries: RwLock<Entries>,
    idle_timeout: Duration,
}

impl InMemorySessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            entries: RwLock::new(Entries {
                map: HashMap::new(),
                last_sweep: Instant::now(),
            }),
            idle_timeout,
        }
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries
            .map
            .values()
            .filter(|entry| !entry.is_expired(self.idle_timeout))
            .count()
    }

    /// Whether there are no live sessions.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, id: &str) -> Result<Option<SessionRecord>, SessionError> {
        let mut entries = self.entries.write().await;

        let expired = match entries.map.get_mut(id) {
            None => return Ok(None),
            Some(entry) if entry.is_expired(self.idle_timeout) => true,
            Some(entry) => {
                entry.last_access = Instant::now();
                return Ok(Some(entry.record.clone()));
            }
        };

        if expired {
            entries.map.remove(id);
            tracing::debug!(target: "gw.session", "Session expired");
        }
        Ok(None)
    }

    async fn save(&self, id: &str, record: &SessionRecord) -> Result<(), SessionError> {
        let mut entries = self.entries.write().await;

        if entries.last_sweep.elapsed() >= self.idle_timeout {
            let before = entries.map.len();
            entries.map.retain(|_, entry| !entry.is_expired(self.idle_timeout));
            entries.last_sweep = Instant::now();
            tracing::trace!(
                target: "gw.session",
                swept = before - entries.map.len(),
                "Swept idle sessions"
            );
        }

        entries.map.insert(
            id.to_string(),
            Entry {
                record: record.clone(),
                last_access: Instant::now(),
            },
        );
        Ok(())
    }

    async fn invalidate(&self, id: &str) -> Result<(), SessionError> {
        self.entries.write().await.map.remove(id);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn record(target: &str) -> SessionRecord {
        SessionRecord {
            redirect_target: Some(target.to_string()),
            ..SessionRecord::default()
        }
    }

    #[tokio::test]
    async fn test_save_load_invalidate() {
        let store = InMemorySessionStore::new(Duration::from_secs(60));

        store.save("a", &record("/one")).await.unwrap();
        assert_eq!(store.load("a").await.unwrap(), Some(record("/one")));
        assert_eq!(store.len().await, 1);

        store.invalidate("a").await.unwrap();
        assert!(store.load("a").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_invalidate_unknown_id_is_ok() {
        let store = InMemorySessionStore::new(Duration::from_secs(60));
        assert!(store.invalidate("missing").await.is_ok());
    }

    #[tokio::test]
    async fn test_idle_sessions_expire() {
        let store = InMemorySessionStore::new(Duration::from_millis(50));

        store.save("a", &record("/one")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(store.load("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_persistent_sessions_never_idle_out() {
        let store = InMemorySessionStore::new(Duration::from_millis(50));
        let persistent = SessionRecord {
            persistent: true,
            ..record("/one")
        };

        store.save("kept", &persistent).await.unwrap();
        store.save("idle", &record("/two")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        // Triggers a sweep
        store.save("fresh", &record("/three")).await.unwrap();

        assert_eq!(store.load("kept").await.unwrap(), Some(persistent));
        assert!(store.load("idle").await.unwrap().is_none());
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_save_sweeps_at_most_once_per_idle_timeout() {
        let store = InMemorySessionStore::new(Duration::from_millis(50));

        store.save("a", &record("/one")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        // A sweep ran recently: the expired entry stays until the next window
        store.entries.write().await.last_sweep = Instant::now();
        store.save("b", &record("/two")).await.unwrap();
        assert_eq!(store.entries.read().await.map.len(), 2);
        assert_eq!(store.len().await, 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        store.save("c", &record("/three")).await.unwrap();

        let entries = store.entries.read().await;
        assert_eq!(entries.map.len(), 1);
        assert!(entries.map.contains_key("c"));
    }

    #[tokio::test]
    async fn test_access_extends_idle_timeout() {
        let store = InMemorySessionStore::new(Duration::from_millis(150));

        store.save("a", &record("/one")).await.unwrap();
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(60)).await;
            assert!(store.load("a").await.unwrap().is_some());
        }
    }
}
