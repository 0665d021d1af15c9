//! Local emulation of a paginated, filterable remote collection API.
//!
//! Every collection is one JSON array under a namespaced key. Mutations are
//! read-modify-write of the whole array: two unawaited mutations of the same
//! collection race, and the last write wins.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::record::{ListQuery, Page, Record};
use crate::error::StoreError;
use crate::latency::{self, DelayStrategy, NoDelay, Operation};
use crate::storage::{collection_key, collection_prefix, Storage};

pub struct ResourceStore {
    storage: Arc<dyn Storage>,
    namespace: String,
    delay: Arc<dyn DelayStrategy>,
    search_fields: HashMap<String, Vec<String>>,
    /// Highest id handed out per collection during this process, so ids of
    /// deleted records are never issued again
    issued: Mutex<HashMap<String, u64>>,
}

impl ResourceStore {
    pub fn new(storage: Arc<dyn Storage>, namespace: &str) -> Self {
        Self {
            storage,
            namespace: namespace.to_string(),
            delay: Arc::new(NoDelay),
            search_fields: HashMap::new(),
            issued: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_delay(mut self, delay: Arc<dyn DelayStrategy>) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_search_fields(mut self, search_fields: HashMap<String, Vec<String>>) -> Self {
        self.search_fields = search_fields;
        self
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Filter by `query.search` and return the requested page.
    pub async fn list(&self, collection: &str, query: &ListQuery) -> Page<Record> {
        latency::simulate(self.delay.as_ref(), Operation::Read).await;

        let records = self.load(collection);
        let fields = self.search_fields.get(collection).map(|f| f.as_slice());
        let filtered: Vec<Record> = match query.search.as_deref() {
            Some(search) => records
                .into_iter()
                .filter(|r| r.matches_search(search, fields))
                .collect(),
            None => records,
        };

        let page = Page::from_filtered(filtered, query.page, query.per_page);
        debug!(
            collection,
            page = page.page,
            total = page.total,
            returned = page.items.len(),
            "Listed records"
        );
        page
    }

    pub async fn get_by_id(&self, collection: &str, id: u64) -> Option<Record> {
        match self.try_get_by_id(collection, id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(collection, id, error = %e, "Failed to read collection, treating as empty");
                None
            }
        }
    }

    /// Like `get_by_id`, but tells "no such record" (`Ok(None)`) apart from
    /// "could not read the collection" (`Err`).
    pub async fn try_get_by_id(&self, collection: &str, id: u64) -> Result<Option<Record>, StoreError> {
        latency::simulate(self.delay.as_ref(), Operation::Read).await;
        Ok(self.load_for_write(collection)?.into_iter().find(|r| r.id == id))
    }

    /// First record whose `field` equals `value` exactly.
    pub async fn find_by(&self, collection: &str, field: &str, value: &Value) -> Option<Record> {
        latency::simulate(self.delay.as_ref(), Operation::Read).await;
        self.load(collection)
            .into_iter()
            .find(|r| r.get(field) == Some(value))
    }

    /// Every record in the collection, in insertion order.
    pub async fn all(&self, collection: &str) -> Vec<Record> {
        latency::simulate(self.delay.as_ref(), Operation::Read).await;
        self.load(collection)
    }

    /// Names of every collection currently persisted.
    pub fn collections(&self) -> Vec<String> {
        let prefix = collection_prefix(&self.namespace);
        match self.storage.keys() {
            Ok(keys) => keys
                .into_iter()
                .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Failed to list collections");
                Vec::new()
            }
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Append a record with the next id. Caller-supplied server fields are
    /// ignored.
    pub async fn create(&self, collection: &str, fields: Map<String, Value>) -> Result<Record, StoreError> {
        latency::simulate(self.delay.as_ref(), Operation::Write).await;

        let mut records = self.load_for_write(collection)?;
        let id = self.next_id(collection, &records);
        let record = Record::new(id, fields);
        records.push(record.clone());
        self.save(collection, &records)?;
        self.note_issued(collection, id);

        debug!(collection, id, "Created record");
        Ok(record)
    }

    /// Merge `patch` onto record `id`. The collection is left untouched when
    /// the record does not exist.
    pub async fn update(
        &self,
        collection: &str,
        id: u64,
        patch: Map<String, Value>,
    ) -> Result<Record, StoreError> {
        latency::simulate(self.delay.as_ref(), Operation::Write).await;

        let mut records = self.load_for_write(collection)?;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        record.merge(patch);
        let updated = record.clone();
        self.save(collection, &records)?;

        debug!(collection, id, "Updated record");
        Ok(updated)
    }

    pub async fn remove(&self, collection: &str, id: u64) -> Result<(), StoreError> {
        latency::simulate(self.delay.as_ref(), Operation::Write).await;

        let mut records = self.load_for_write(collection)?;
        let position = records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        self.note_issued(collection, max_id(&records));
        records.remove(position);
        self.save(collection, &records)?;

        debug!(collection, id, "Removed record");
        Ok(())
    }

    /// Drop the whole collection. Ids already issued stay retired.
    pub async fn clear(&self, collection: &str) -> Result<(), StoreError> {
        latency::simulate(self.delay.as_ref(), Operation::Write).await;

        // Also the way out of a corrupt payload, which every other write refuses
        if let Ok(records) = self.load_for_write(collection) {
            self.note_issued(collection, max_id(&records));
        }
        self.storage
            .remove_item(&collection_key(&self.namespace, collection))
            .map_err(StoreError::storage)?;

        debug!(collection, "Cleared collection");
        Ok(())
    }

    /// Populate an empty collection with `rows`, assigning ids in order.
    /// Returns how many records were written; a populated collection is left
    /// alone and reports zero.
    pub async fn seed(&self, collection: &str, rows: Vec<Map<String, Value>>) -> Result<usize, StoreError> {
        latency::simulate(self.delay.as_ref(), Operation::Write).await;

        let mut records = self.load_for_write(collection)?;
        if !records.is_empty() {
            return Ok(0);
        }

        for fields in rows {
            let id = self.next_id(collection, &records);
            records.push(Record::new(id, fields));
            self.note_issued(collection, id);
        }
        self.save(collection, &records)?;

        debug!(collection, count = records.len(), "Seeded collection");
        Ok(records.len())
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Read path: anything unreadable degrades to an empty collection.
    fn load(&self, collection: &str) -> Vec<Record> {
        match self.load_for_write(collection) {
            Ok(records) => records,
            Err(e) => {
                warn!(collection, error = %e, "Failed to read collection, treating as empty");
                Vec::new()
            }
        }
    }

    /// Write path: a mutation never overwrites data it could not read, so
    /// I/O failures and unparseable payloads are both reported. `clear` is
    /// the only write that proceeds past a corrupt payload.
    fn load_for_write(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        let key = collection_key(&self.namespace, collection);
        let Some(contents) = self.storage.get_item(&key).map_err(StoreError::storage)? else {
            return Ok(Vec::new());
        };

        serde_json::from_str::<Vec<Record>>(&contents).map_err(|e| {
            warn!(collection, error = %e, "Collection payload is corrupt");
            StoreError::from(e)
        })
    }

    fn save(&self, collection: &str, records: &[Record]) -> Result<(), StoreError> {
        let contents = serde_json::to_string(records)?;
        self.storage
            .set_item(&collection_key(&self.namespace, collection), &contents)
            .map_err(|e| {
                warn!(collection, error = %e, "Failed to persist collection");
                StoreError::storage(e)
            })
    }

    fn next_id(&self, collection: &str, records: &[Record]) -> u64 {
        let issued = self
            .issued
            .lock()
            .map(|issued| issued.get(collection).copied().unwrap_or(0))
            .unwrap_or(0);
        max_id(records).max(issued) + 1
    }

    fn note_issued(&self, collection: &str, id: u64) {
        if let Ok(mut issued) = self.issued.lock() {
            let entry = issued.entry(collection.to_string()).or_insert(0);
            *entry = (*entry).max(id);
        }
    }
}

fn max_id(records: &[Record]) -> u64 {
    records.iter().map(|r| r.id).max().unwrap_or(0)
}
