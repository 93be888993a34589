//! Generator sessions
//!
//! Each generator keeps a private, linear conversation with its model for the
//! lifetime of a run. Revisions are appended to that conversation so only the
//! critiques travel on the wire, not the original request again.
//!
//! The store is partitioned by run id. Every (run, generator) slot is its own
//! async mutex: two generators of one run never wait on each other, while two
//! writers of the same slot are serialized. Retention is governed by an
//! injected [`EvictionPolicy`].

use crate::llm::Message;
use lru::LruCache;
use sdk::types::{GeneratorIndex, GENERATOR_COUNT};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Handle to one generator's conversation
pub type SessionHandle = Arc<tokio::sync::Mutex<Vec<Message>>>;

/// How long sessions of finished or abandoned runs are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Keep every run until its sessions are dropped
    Unbounded,

    /// Keep the `max_runs` most recently used runs
    Lru { max_runs: usize },

    /// Forget runs that have not been touched for `ttl`
    Ttl { ttl: Duration },
}

#[derive(Debug)]
struct RunSessions {
    slots: [Option<SessionHandle>; GENERATOR_COUNT],
    last_used: Instant,
}

impl RunSessions {
    fn new() -> Self {
        Self {
            slots: Default::default(),
            last_used: Instant::now(),
        }
    }

    fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

/// Conversation store keyed by (run id, generator index)
#[derive(Debug)]
pub struct SessionStore {
    policy: EvictionPolicy,
    runs: Mutex<LruCache<String, RunSessions>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(EvictionPolicy::Unbounded)
    }
}

impl SessionStore {
    pub fn new(policy: EvictionPolicy) -> Self {
        let cache = match policy {
            EvictionPolicy::Lru { max_runs } => match NonZeroUsize::new(max_runs) {
                Some(capacity) => LruCache::new(capacity),
                None => LruCache::unbounded(),
            },
            EvictionPolicy::Unbounded | EvictionPolicy::Ttl { .. } => LruCache::unbounded(),
        };

        Self {
            policy,
            runs: Mutex::new(cache),
        }
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// Session for a generator of a run, created empty if absent
    pub fn get(&self, run_id: &str, index: GeneratorIndex) -> SessionHandle {
        let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        self.purge_expired(&mut runs);

        if !runs.contains(run_id) {
            if let Some((evicted, _)) = runs.push(run_id.to_string(), RunSessions::new()) {
                if evicted != run_id {
                    tracing::debug!("Evicted generator sessions of run {}", evicted);
                }
            }
        }

        // Present: inserted above if it was missing
        let Some(run) = runs.get_mut(run_id) else {
            return SessionHandle::default();
        };
        run.last_used = Instant::now();
        run.slots[index.slot()]
            .get_or_insert_with(SessionHandle::default)
            .clone()
    }

    /// Remove a generator's session entirely
    pub fn remove(&self, run_id: &str, index: GeneratorIndex) {
        let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);

        let now_empty = match runs.peek_mut(run_id) {
            Some(run) => {
                run.slots[index.slot()] = None;
                run.is_empty()
            }
            None => false,
        };

        if now_empty {
            runs.pop(run_id);
        }
    }

    /// Whether a session exists, without creating it or refreshing recency
    pub fn contains(&self, run_id: &str, index: GeneratorIndex) -> bool {
        let runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        runs.peek(run_id)
            .map(|run| run.slots[index.slot()].is_some())
            .unwrap_or(false)
    }

    /// Number of runs currently holding at least one session
    pub fn run_count(&self) -> usize {
        let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        self.purge_expired(&mut runs);
        runs.len()
    }

    fn purge_expired(&self, runs: &mut LruCache<String, RunSessions>) {
        let EvictionPolicy::Ttl { ttl } = self.policy else {
            return;
        };

        let expired: Vec<String> = runs
            .iter()
            .filter(|(_, run)| run.last_used.elapsed() > ttl)
            .map(|(run_id, _)| run_id.clone())
            .collect();

        for run_id in expired {
            tracing::debug!("Generator sessions of run {} expired", run_id);
            runs.pop(&run_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(value: u8) -> GeneratorIndex {
        GeneratorIndex::new(value).unwrap()
    }

    #[tokio::test]
    async fn test_get_creates_empty_session_lazily() {
        let store = SessionStore::default();
        assert!(!store.contains("run", index(1)));

        let session = store.get("run", index(1));
        assert!(session.lock().await.is_empty());
        assert!(store.contains("run", index(1)));
        assert!(!store.contains("run", index(2)));
    }

    #[tokio::test]
    async fn test_get_returns_same_conversation() {
        let store = SessionStore::default();
        store
            .get("run", index(2))
            .lock()
            .await
            .push(Message::user("request"));

        let again = store.get("run", index(2));
        assert_eq!(again.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_resets_conversation() {
        let store = SessionStore::default();
        store
            .get("run", index(3))
            .lock()
            .await
            .push(Message::user("request"));

        store.remove("run", index(3));
        assert!(!store.contains("run", index(3)));
        assert!(store.get("run", index(3)).lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_slots_of_one_run_do_not_block_each_other() {
        let store = SessionStore::default();
        let first = store.get("run", index(1));
        let _held = first.lock().await;

        let second = store.get("run", index(2));
        assert!(second.try_lock().is_ok());
    }

    #[test]
    fn test_runs_are_partitioned() {
        let store = SessionStore::default();
        store.get("run-a", index(1));
        store.get("run-b", index(1));
        store.remove("run-a", index(1));

        assert!(!store.contains("run-a", index(1)));
        assert!(store.contains("run-b", index(1)));
        assert_eq!(store.run_count(), 1);
    }

    #[test]
    fn test_lru_keeps_most_recent_runs() {
        let store = SessionStore::new(EvictionPolicy::Lru { max_runs: 2 });
        store.get("run-a", index(1));
        store.get("run-b", index(1));
        store.get("run-a", index(2));
        store.get("run-c", index(1));

        assert!(store.contains("run-a", index(1)));
        assert!(!store.contains("run-b", index(1)));
        assert!(store.contains("run-c", index(1)));
        assert_eq!(store.run_count(), 2);
    }

    #[test]
    fn test_ttl_forgets_idle_runs() {
        let store = SessionStore::new(EvictionPolicy::Ttl {
            ttl: Duration::from_millis(10),
        });
        store.get("run-a", index(1));
        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(store.run_count(), 0);
        assert!(!store.contains("run-a", index(1)));
    }
}
