//! Per-chat session registry.
//!
//! A [`Session`] is an immutable snapshot of one successful load. Reloading a
//! chat builds a new snapshot and swaps it in, so a query that already holds
//! the previous `Arc<Session>` finishes against the previous generation.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::models::FileRecord;

#[derive(Debug)]
pub struct Session {
    pub key: String,
    /// Identifies this load's data inside the context store.
    pub generation: Uuid,
    pub repo_url: String,
    pub repo_name: String,
    /// Eligible files in traversal order.
    pub files: Vec<FileRecord>,
    pub loaded_at: DateTime<Utc>,
    last_access: Mutex<Instant>,
}

impl Session {
    pub fn new(
        key: impl Into<String>,
        generation: Uuid,
        repo_url: impl Into<String>,
        repo_name: impl Into<String>,
        files: Vec<FileRecord>,
    ) -> Self {
        Self {
            key: key.into(),
            generation,
            repo_url: repo_url.into(),
            repo_name: repo_name.into(),
            files,
            loaded_at: Utc::now(),
            last_access: Mutex::new(Instant::now()),
        }
    }

    pub fn touch(&self) {
        *self.last_access.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_access.lock().elapsed()
    }

    #[cfg(test)]
    pub(crate) fn backdate(&self, by: Duration) {
        let mut last = self.last_access.lock();
        if let Some(earlier) = last.checked_sub(by) {
            *last = earlier;
        }
    }
}

/// Live sessions keyed by chat id, plus the per-key locks that serialise loads.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    load_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            load_locks: Mutex::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
        }
    }

    /// Look up a session and mark it as recently used.
    pub fn get(&self, key: &str) -> Option<Arc<Session>> {
        let session = self.sessions.read().get(key).cloned()?;
        session.touch();
        Some(session)
    }

    /// Install `session` under its key. Returns the snapshot it replaced and
    /// any sessions evicted to stay within capacity.
    pub fn install(&self, session: Session) -> (Option<Arc<Session>>, Vec<Arc<Session>>) {
        let key = session.key.clone();
        let mut sessions = self.sessions.write();
        let replaced = sessions.insert(key.clone(), Arc::new(session));

        let mut evicted = Vec::new();
        while sessions.len() > self.max_sessions {
            let lru = sessions
                .iter()
                .filter(|(k, _)| **k != key)
                .max_by_key(|(_, s)| s.idle_for())
                .map(|(k, _)| k.clone());
            match lru.and_then(|k| sessions.remove(&k)) {
                Some(old) => evicted.push(old),
                None => break,
            }
        }
        (replaced, evicted)
    }

    /// When the most recent successful load finished.
    pub fn latest_load(&self) -> Option<DateTime<Utc>> {
        self.sessions.read().values().map(|s| s.loaded_at).max()
    }

    /// Remove every session idle for longer than `ttl`.
    pub fn evict_expired(&self, ttl: Duration) -> Vec<Arc<Session>> {
        let mut sessions = self.sessions.write();
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.idle_for() > ttl)
            .map(|(k, _)| k.clone())
            .collect();
        let evicted: Vec<Arc<Session>> = expired
            .iter()
            .filter_map(|k| sessions.remove(k))
            .collect();
        drop(sessions);

        // Locks nobody holds and whose session is gone are no longer needed.
        let live = self.sessions.read();
        self.load_locks
            .lock()
            .retain(|k, lock| live.contains_key(k) || Arc::strong_count(lock) > 1);
        evicted
    }

    /// The lock that serialises loads for `key`.
    pub fn load_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.load_locks
            .lock()
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
