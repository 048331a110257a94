//! In-memory store for finished generation results.
//!
//! Reads are destructive: a result can be collected exactly once, after
//! which the id is unknown again. Results for jobs nobody collects stay in
//! memory until the process exits.

use dashmap::DashMap;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct ResultStore {
    entries: DashMap<Uuid, String>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: Uuid, critical_css: String) {
        self.entries.insert(id, critical_css);
    }

    /// Remove and return the result for `id`, if present.
    pub fn take(&self, id: &Uuid) -> Option<String> {
        self.entries.remove(id).map(|(_, css)| css)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_is_one_shot() {
        let store = ResultStore::new();
        let id = Uuid::new_v4();
        store.insert(id, ".a{color:red}".to_string());

        assert_eq!(store.take(&id).as_deref(), Some(".a{color:red}"));
        assert_eq!(store.take(&id), None);
        assert!(store.is_empty());
    }

    #[test]
    fn unknown_id_yields_nothing() {
        let store = ResultStore::new();
        assert_eq!(store.take(&Uuid::new_v4()), None);
    }
}
