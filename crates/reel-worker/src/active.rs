//! In-process registry of jobs that have a live background task.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

/// Ids of jobs currently owned by a task in this process.
#[derive(Debug)]
pub(crate) struct ActiveSet<K> {
    ids: Arc<Mutex<HashSet<K>>>,
}

impl<K> Clone for ActiveSet<K> {
    fn clone(&self) -> Self {
        Self {
            ids: Arc::clone(&self.ids),
        }
    }
}

impl<K> Default for ActiveSet<K> {
    fn default() -> Self {
        Self {
            ids: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}

impl<K: Eq + Hash + Clone> ActiveSet<K> {
    /// Take ownership of `id`, or `None` if another task already holds it.
    pub(crate) fn claim(&self, id: &K) -> Option<ActiveGuard<K>> {
        let mut ids = self.ids.lock().unwrap_or_else(|p| p.into_inner());
        ids.insert(id.clone()).then(|| ActiveGuard {
            ids: Arc::clone(&self.ids),
            id: id.clone(),
        })
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: &K) -> bool {
        self.ids.lock().unwrap_or_else(|p| p.into_inner()).contains(id)
    }
}

/// Releases the id when the owning task ends.
pub(crate) struct ActiveGuard<K: Eq + Hash> {
    ids: Arc<Mutex<HashSet<K>>>,
    id: K,
}

impl<K: Eq + Hash> Drop for ActiveGuard<K> {
    fn drop(&mut self) {
        let mut ids = self.ids.lock().unwrap_or_else(|p| p.into_inner());
        ids.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_is_exclusive_until_guard_drops() {
        let active = ActiveSet::<String>::default();
        let guard = active.claim(&"a".to_string()).unwrap();
        assert!(active.claim(&"a".to_string()).is_none());
        assert!(active.contains(&"a".to_string()));
        drop(guard);
        assert!(!active.contains(&"a".to_string()));
        assert!(active.claim(&"a".to_string()).is_some());
    }
}
