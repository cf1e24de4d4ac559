//! Document store: key -> latest document, plus per-key write locks.

use dashmap::DashMap;
use std::sync::{Arc, Mutex};

use crate::types::{Document, Fields};

/// Concurrent map of documents.
///
/// Writers of the same key are serialized through [`DocumentStore::key_lock`];
/// the map itself only guarantees per-entry atomicity.
#[derive(Debug, Default)]
pub struct DocumentStore {
    docs: DashMap<String, Document>,
    /// Per-key locks to serialize writes to one document.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the lock guarding writes to `key`.
    pub fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Forget the lock of a deleted key unless another writer holds a handle.
    pub fn release_key_lock(&self, key: &str) {
        self.locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    pub fn get(&self, key: &str) -> Option<Document> {
        self.docs.get(key).map(|d| d.value().clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.docs.contains_key(key)
    }

    pub fn version_of(&self, key: &str) -> Option<u64> {
        self.docs.get(key).map(|d| d.version)
    }

    /// Store `fields` under `key`, bumping the version. Returns the new version.
    pub fn put(&self, key: &str, fields: Fields) -> u64 {
        let mut entry = self.docs.entry(key.to_string()).or_insert_with(|| Document {
            key: key.to_string(),
            version: 0,
            fields: Fields::new(),
        });
        entry.version += 1;
        entry.fields = fields;
        entry.version
    }

    /// Insert a document exactly as given (snapshot recovery).
    pub fn restore(&self, doc: Document) {
        self.docs.insert(doc.key.clone(), doc);
    }

    pub fn remove(&self, key: &str) -> Option<Document> {
        self.docs.remove(key).map(|(_, d)| d)
    }

    /// Keys matching any of `prefixes` (every key if empty), sorted.
    pub fn keys_with_prefix(&self, prefixes: &[String]) -> Vec<String> {
        let mut keys: Vec<String> = self
            .docs
            .iter()
            .map(|e| e.key().clone())
            .filter(|k| prefixes.is_empty() || prefixes.iter().any(|p| k.starts_with(p.as_str())))
            .collect();
        keys.sort();
        keys
    }

    /// Copy of every document, sorted by key.
    pub fn snapshot(&self) -> Vec<Document> {
        let mut docs: Vec<Document> = self.docs.iter().map(|e| e.value().clone()).collect();
        docs.sort_by(|a, b| a.key.cmp(&b.key));
        docs
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}
