//! Per-conversation memory registry.
//!
//! Each session id owns one [`SessionMemory`] behind its own async mutex,
//! so turns of the same conversation are serialized while different
//! conversations never share history.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use minerag_core::memory::SessionMemory;

/// Session id used when a caller does not name one.
pub const DEFAULT_SESSION: &str = "default";

pub type SharedMemory = Arc<Mutex<SessionMemory>>;

pub struct SessionStore {
    sessions: Mutex<HashMap<String, SharedMemory>>,
    max_rounds: usize,
}

impl SessionStore {
    pub fn new(max_rounds: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_rounds,
        }
    }

    /// The memory for `id`, created empty on first use.
    pub async fn get_or_create(&self, id: &str) -> SharedMemory {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(SessionMemory::new(self.max_rounds))))
            .clone()
    }

    /// Clear the memory of `id`. Returns false if the session is unknown.
    pub async fn reset(&self, id: &str) -> bool {
        let memory = self.sessions.lock().await.get(id).cloned();
        match memory {
            Some(memory) => {
                memory.lock().await.reset();
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, id: &str) -> bool {
        self.sessions.lock().await.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = SessionStore::new(5);
        let a = store.get_or_create("a").await;
        a.lock().await.add_query("上海天气");
        let b = store.get_or_create("b").await;
        assert!(b.lock().await.is_empty());
        assert_eq!(store.get_or_create("a").await.lock().await.len(), 1);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_reset_and_remove() {
        let store = SessionStore::new(5);
        store.get_or_create("a").await.lock().await.add_query("q");
        assert!(store.reset("a").await);
        assert!(store.get_or_create("a").await.lock().await.is_empty());
        assert!(!store.reset("missing").await);
        assert!(store.remove("a").await);
        assert!(!store.remove("a").await);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_max_rounds_applied() {
        let store = SessionStore::new(3);
        let memory = store.get_or_create("x").await;
        assert_eq!(memory.lock().await.max_rounds(), 3);
    }
}
