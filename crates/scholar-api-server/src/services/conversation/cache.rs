use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::models::chat::SessionId;

use super::types::Session;

struct Entry {
    created_at: Instant,
    session: Arc<Mutex<Session>>,
}

/// Thread-safe in-memory session store. Each session sits behind its own
/// async mutex, so turns on one session run strictly one at a time while
/// separate sessions never contend.
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<DashMap<SessionId, Entry>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        info!("Initializing session store (ttl: {:?})", ttl);
        Self {
            storage: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Look up a session, lazily dropping it when expired.
    pub fn get(&self, session_id: &str) -> Option<Arc<Mutex<Session>>> {
        let entry = self.storage.get(session_id)?;

        if entry.created_at.elapsed() > self.ttl {
            drop(entry); // release the read lock before removing
            self.remove(session_id);
            debug!("Session {} expired, removed from store", session_id);
            return None;
        }

        Some(entry.session.clone())
    }

    pub fn get_or_create(&self, session_id: &str) -> Arc<Mutex<Session>> {
        if let Some(session) = self.get(session_id) {
            return session;
        }

        // Atomic entry insertion: two callers racing on a new id must end up
        // sharing one session, or writes through the loser would vanish.
        self.storage
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!("Creating session {}", session_id);
                Entry {
                    created_at: Instant::now(),
                    session: Arc::new(Mutex::new(Session::new(session_id.to_string()))),
                }
            })
            .session
            .clone()
    }

    /// Explicit teardown. Returns whether the session existed.
    pub fn remove(&self, session_id: &str) -> bool {
        self.storage.remove(session_id).is_some()
    }

    /// Sweep expired sessions; returns how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.storage.len();
        self.storage
            .retain(|_, entry| entry.created_at.elapsed() <= self.ttl);
        before - self.storage.len()
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_reuses_the_same_session() {
        let store = SessionStore::new(Duration::from_secs(60));

        let first = store.get_or_create("s1");
        first.lock().await.set_context("Thesis draft.".to_string());

        let second = store.get_or_create("s1");
        assert!(second.lock().await.context.as_context_text().is_some());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn expired_sessions_are_dropped_on_access() {
        let store = SessionStore::new(Duration::from_millis(1));
        store.get_or_create("s1");

        tokio::time::sleep(Duration::from_millis(5)).await;

        assert!(store.get("s1").is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn cleanup_sweeps_expired_entries() {
        let store = SessionStore::new(Duration::from_millis(1));
        store.get_or_create("s1");
        store.get_or_create("s2");

        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(store.cleanup_expired(), 2);
        assert!(store.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_creates_share_one_session() {
        for _ in 0..200 {
            let store = SessionStore::new(Duration::from_secs(60));

            let a = {
                let store = store.clone();
                tokio::spawn(async move { store.get_or_create("s1") })
            };
            let b = {
                let store = store.clone();
                tokio::spawn(async move { store.get_or_create("s1") })
            };
            let (a, b) = (a.await.unwrap(), b.await.unwrap());

            assert!(Arc::ptr_eq(&a, &b), "racing creates must not orphan a session");

            // A write through either handle is visible via the store.
            a.lock().await.set_context("Thesis draft.".to_string());
            let via_store = store.get("s1").expect("session exists");
            assert!(via_store.lock().await.context.as_context_text().is_some());
        }
    }

    #[test]
    fn remove_reports_existence() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.get_or_create("s1");

        assert!(store.remove("s1"));
        assert!(!store.remove("s1"));
    }
}
