//! The engine: document store, index registry and the write/query paths
//! that keep them consistent.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, instrument, warn};

use crate::cancel::{check_every, CancelToken};
use crate::config::EngineConfig;
use crate::error::{Result, TesseraError};
use crate::index::{SearchIndex, StagedDocument, Tokenizer};
use crate::metrics::{
    GaugeGuard, ACTIVE_QUERIES, DOCUMENTS_DELETED_TOTAL, DOCUMENTS_WRITTEN_TOTAL,
    INDEXING_FAILURES_TOTAL, QUERIES_TOTAL, QUERY_DURATION,
};
use crate::query::executor::Executor;
use crate::query::{parse, SearchOptions};
use crate::schema::{IndexDefinition, IndexInfo};
use crate::store::DocumentStore;
use crate::types::{check_fields, fields_from_json, Document, Fields, SearchResults};

/// How `put_with` combines new fields with an existing document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// The new field set replaces the document.
    #[default]
    Replace,
    /// New fields overwrite same-named fields; other fields are kept.
    Merge,
}

/// Keyed document operations.
pub trait DocumentCommands {
    /// Replace the document at `key`. Returns the new version.
    fn put(&self, key: &str, fields: Fields) -> Result<u64> {
        self.put_with(key, fields, WriteMode::Replace)
    }

    fn put_with(&self, key: &str, fields: Fields, mode: WriteMode) -> Result<u64>;

    /// Store a JSON object, flattened to `$.path` fields.
    fn put_json(&self, key: &str, value: &serde_json::Value) -> Result<u64> {
        self.put(key, fields_from_json(value)?)
    }

    fn get(&self, key: &str) -> Option<Document>;

    /// Returns `false` if there was no document at `key`.
    fn delete(&self, key: &str) -> bool;
}

/// Index lifecycle and search.
pub trait SearchCommands {
    /// Register an index and index every existing document it matches.
    fn define_index(&self, definition: IndexDefinition) -> Result<()> {
        self.define_index_with(definition, None)
    }

    /// Like `define_index`, with a token that can abort the backfill. A
    /// cancelled backfill unregisters the index again.
    fn define_index_with(
        &self,
        definition: IndexDefinition,
        cancel: Option<&CancelToken>,
    ) -> Result<()>;

    fn drop_index(&self, name: &str, delete_documents: bool) -> Result<()>;

    /// `drop_index` that treats a missing index as a no-op. Returns whether
    /// an index was dropped.
    fn drop_index_if_exists(&self, name: &str, delete_documents: bool) -> Result<bool> {
        match self.drop_index(name, delete_documents) {
            Ok(()) => Ok(true),
            Err(TesseraError::IndexNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn index_info(&self, name: &str) -> Result<IndexInfo>;

    /// Index names, sorted.
    fn list_indexes(&self) -> Vec<String>;

    fn search(&self, index: &str, query: &str, options: &SearchOptions) -> Result<SearchResults>;
}

/// In-process search engine. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    store: DocumentStore,
    registry: RwLock<BTreeMap<String, Arc<SearchIndex>>>,
    tokenizer: Tokenizer,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let tokenizer = Tokenizer::new(&config.stop_words);
        Self {
            config,
            store: DocumentStore::new(),
            registry: RwLock::new(BTreeMap::new()),
            tokenizer,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Definitions of every registered index, sorted by name.
    pub fn definitions(&self) -> Vec<IndexDefinition> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|idx| idx.definition().clone())
            .collect()
    }

    fn index(&self, name: &str) -> Result<Arc<SearchIndex>> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| TesseraError::IndexNotFound {
                name: name.to_string(),
            })
    }

    /// Indexes whose prefixes match `key`, in name order. Write locks are
    /// always taken in this order.
    fn matching_indexes(&self, key: &str) -> Vec<Arc<SearchIndex>> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|idx| idx.definition().matches_key(key))
            .cloned()
            .collect()
    }

    /// Index every stored document matching a freshly registered index.
    fn backfill(&self, index: &SearchIndex, cancel: Option<&CancelToken>) -> Result<usize> {
        let keys = self.store.keys_with_prefix(&index.definition().prefixes);
        let mut indexed = 0;
        for (step, key) in keys.iter().enumerate() {
            check_every(cancel, step, 256)?;

            let lock = self.store.key_lock(key);
            let _key_guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(doc) = self.store.get(key) else {
                continue;
            };
            match index.stage(&self.tokenizer, &doc.fields) {
                Ok(staged) => {
                    index.write().commit(key, &staged);
                    indexed += 1;
                }
                Err(e) => {
                    index.record_failure();
                    INDEXING_FAILURES_TOTAL
                        .with_label_values(&[index.name()])
                        .inc();
                    warn!(index = index.name(), key = %key, error = %e, "skipping document during backfill");
                }
            }
        }
        Ok(indexed)
    }
}

impl DocumentCommands for Engine {
    #[instrument(skip(self, fields), fields(key = key, mode = ?mode))]
    fn put_with(&self, key: &str, fields: Fields, mode: WriteMode) -> Result<u64> {
        check_fields(&fields)?;
        let lock = self.store.key_lock(key);
        let _key_guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let fields = match (mode, self.store.get(key)) {
            (WriteMode::Merge, Some(existing)) => {
                let mut merged = existing.fields;
                merged.extend(fields);
                merged
            }
            _ => fields,
        };

        // Validate against every index before anything is mutated.
        let indexes = self.matching_indexes(key);
        let staged: Vec<StagedDocument> = indexes
            .iter()
            .map(|idx| idx.stage(&self.tokenizer, &fields))
            .collect::<Result<_>>()?;

        let mut guards: Vec<_> = indexes.iter().map(|idx| idx.write()).collect();
        let version = self.store.put(key, fields);
        for (data, doc) in guards.iter_mut().zip(&staged) {
            data.commit(key, doc);
        }
        drop(guards);

        DOCUMENTS_WRITTEN_TOTAL.inc();
        debug!(version, indexes = indexes.len(), "stored document");
        Ok(version)
    }

    fn get(&self, key: &str) -> Option<Document> {
        self.store.get(key)
    }

    #[instrument(skip(self), fields(key = key))]
    fn delete(&self, key: &str) -> bool {
        let lock = self.store.key_lock(key);
        let key_guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let indexes = self.matching_indexes(key);
        let mut guards: Vec<_> = indexes.iter().map(|idx| idx.write()).collect();
        let removed = self.store.remove(key).is_some();
        for data in guards.iter_mut() {
            data.remove(key);
        }
        drop(guards);
        drop(key_guard);
        drop(lock);
        self.store.release_key_lock(key);

        if removed {
            DOCUMENTS_DELETED_TOTAL.inc();
            debug!("deleted document");
        }
        removed
    }
}

impl SearchCommands for Engine {
    #[instrument(skip(self, definition, cancel), fields(index = %definition.name))]
    fn define_index_with(
        &self,
        definition: IndexDefinition,
        cancel: Option<&CancelToken>,
    ) -> Result<()> {
        definition.validate(self.config.max_dimension)?;
        let name = definition.name.clone();
        let index = Arc::new(SearchIndex::new(definition, &self.config));
        {
            let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
            if registry.contains_key(&name) {
                return Err(TesseraError::DuplicateIndex { name });
            }
            registry.insert(name.clone(), Arc::clone(&index));
        }

        match self.backfill(&index, cancel) {
            Ok(indexed) => {
                info!(
                    indexed,
                    failures = index.indexing_failures(),
                    "created index"
                );
                Ok(())
            }
            Err(e) => {
                let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
                if registry
                    .get(&name)
                    .is_some_and(|current| Arc::ptr_eq(current, &index))
                {
                    registry.remove(&name);
                }
                warn!(error = %e, "index backfill aborted");
                Err(e)
            }
        }
    }

    #[instrument(skip(self), fields(index = name))]
    fn drop_index(&self, name: &str, delete_documents: bool) -> Result<()> {
        let index = self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .ok_or_else(|| TesseraError::IndexNotFound {
                name: name.to_string(),
            })?;

        let mut deleted = 0usize;
        if delete_documents {
            for key in self.store.keys_with_prefix(&index.definition().prefixes) {
                if self.delete(&key) {
                    deleted += 1;
                }
            }
        }
        info!(deleted, "dropped index");
        Ok(())
    }

    fn index_info(&self, name: &str) -> Result<IndexInfo> {
        Ok(self.index(name)?.info())
    }

    fn list_indexes(&self) -> Vec<String> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    #[instrument(skip(self, options), fields(index = index_name))]
    fn search(
        &self,
        index_name: &str,
        query: &str,
        options: &SearchOptions,
    ) -> Result<SearchResults> {
        let index = self.index(index_name)?;
        let parsed = parse(query)?;

        QUERIES_TOTAL.with_label_values(&[index_name]).inc();
        ACTIVE_QUERIES.inc();
        let _active = GaugeGuard(&ACTIVE_QUERIES);
        let _timer = QUERY_DURATION
            .with_label_values(&[index_name])
            .start_timer();

        let data = index.read();
        let results = Executor::new(
            &index,
            &data,
            &self.store,
            &self.tokenizer,
            self.config.brute_force_threshold,
            options,
        )
        .execute(&parsed)?;

        debug!(total = results.total, returned = results.hits.len(), "search complete");
        Ok(results)
    }
}
