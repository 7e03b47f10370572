use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bks_reconcile::{
    Cursor, DocumentPublisher, ExternalRecord, FieldValue, Page, QueryFilter, RecordFields,
    RecordHandle, RecordStore, StoreError,
};

/// One record as the in-memory store holds it.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredRecord {
    pub handle: RecordHandle,
    pub fields: RecordFields,
}

/// Calls observed since construction (or the last [`InMemoryStore::reset_counters`]).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreCounters {
    pub query_calls: usize,
    pub creates: usize,
    pub updates: usize,
    pub failed_writes: usize,
}

#[derive(Default)]
struct Inner {
    collections: BTreeMap<String, Vec<StoredRecord>>,
    next_id: u64,
    counters: StoreCounters,
    fail_query_page: Option<usize>,
    fail_keys: BTreeSet<String>,
}

/// Paginated store over ordered in-memory collections.
///
/// The cursor is the offset of the next record; the page size comes from the
/// filter. Keys are read from `filter.key_field` at query time, so seeded
/// records may carry any field layout.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test thread must not hide the state from the assertions.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert a record directly, bypassing counters.
    pub fn seed(&self, collection: &str, fields: RecordFields) -> RecordHandle {
        let mut inner = self.lock();
        inner.next_id += 1;
        let handle = RecordHandle(format!("rec-{}", inner.next_id));
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(StoredRecord {
                handle: handle.clone(),
                fields,
            });
        handle
    }

    /// Seed `count` records keyed `{prefix}{n}` in `key_field`.
    pub fn seed_keys(&self, collection: &str, key_field: &str, prefix: &str, count: usize) {
        for n in 0..count {
            self.seed(
                collection,
                RecordFields::new().with(key_field, FieldValue::Title(format!("{prefix}{n}"))),
            );
        }
    }

    /// Fail the query for the zero-based page `page` of every listing.
    pub fn fail_query_on_page(&self, page: usize) {
        self.lock().fail_query_page = Some(page);
    }

    /// Fail every create/update of a record whose title field equals `key`.
    pub fn fail_writes_for(&self, key: impl Into<String>) {
        self.lock().fail_keys.insert(key.into());
    }

    pub fn clear_failures(&self) {
        let mut inner = self.lock();
        inner.fail_query_page = None;
        inner.fail_keys.clear();
    }

    pub fn counters(&self) -> StoreCounters {
        self.lock().counters.clone()
    }

    pub fn reset_counters(&self) {
        self.lock().counters = StoreCounters::default();
    }

    pub fn records(&self, collection: &str) -> Vec<StoredRecord> {
        self.lock()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self, collection: &str) -> usize {
        self.lock().collections.get(collection).map_or(0, Vec::len)
    }

    /// Records whose `key_field` equals `key`.
    pub fn find(&self, collection: &str, key_field: &str, key: &str) -> Vec<StoredRecord> {
        self.records(collection)
            .into_iter()
            .filter(|r| r.fields.get(key_field).and_then(field_text).as_deref() == Some(key))
            .collect()
    }
}

fn field_text(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Title(s) | FieldValue::Text(s) | FieldValue::Select(s) => Some(s.clone()),
        FieldValue::Number(n) => Some(n.to_string()),
        FieldValue::Date(ts) => Some(ts.to_rfc3339()),
    }
}

fn should_fail(inner: &Inner, fields: &RecordFields) -> bool {
    fields
        .iter()
        .any(|(_, v)| matches!(v, FieldValue::Title(s) if inner.fail_keys.contains(s)))
}

#[async_trait]
impl RecordStore for InMemoryStore {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn query_page(
        &self,
        filter: &QueryFilter,
        cursor: Option<&Cursor>,
    ) -> Result<Page, StoreError> {
        let mut inner = self.lock();
        inner.counters.query_calls += 1;

        let page_size = filter.page_size.max(1) as usize;
        let offset = match cursor {
            Some(c) => c
                .0
                .parse::<usize>()
                .map_err(|_| StoreError::Decode(format!("bad cursor '{}'", c.0)))?,
            None => 0,
        };
        if inner.fail_query_page == Some(offset / page_size) {
            return Err(StoreError::Transport(format!(
                "injected failure on page {}",
                offset / page_size
            )));
        }

        let all = inner
            .collections
            .get(&filter.collection)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let records = all
            .iter()
            .skip(offset)
            .take(page_size)
            .map(|r| ExternalRecord {
                handle: r.handle.clone(),
                key: r.fields.get(&filter.key_field).and_then(field_text),
            })
            .collect();
        let next = offset + page_size;
        Ok(Page {
            records,
            next_cursor: (next < all.len()).then(|| Cursor(next.to_string())),
        })
    }

    async fn create_record(
        &self,
        collection: &str,
        fields: &RecordFields,
    ) -> Result<RecordHandle, StoreError> {
        let mut inner = self.lock();
        if should_fail(&inner, fields) {
            inner.counters.failed_writes += 1;
            return Err(StoreError::Api {
                status: 500,
                message: "injected create failure".to_string(),
            });
        }
        inner.counters.creates += 1;
        inner.next_id += 1;
        let handle = RecordHandle(format!("rec-{}", inner.next_id));
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(StoredRecord {
                handle: handle.clone(),
                fields: fields.clone(),
            });
        Ok(handle)
    }

    async fn update_record(
        &self,
        handle: &RecordHandle,
        fields: &RecordFields,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if should_fail(inner, fields) {
            inner.counters.failed_writes += 1;
            return Err(StoreError::Api {
                status: 500,
                message: "injected update failure".to_string(),
            });
        }
        let target = inner
            .collections
            .values_mut()
            .flat_map(|records| records.iter_mut())
            .find(|r| &r.handle == handle);
        match target {
            Some(record) => {
                record.fields = fields.clone();
                inner.counters.updates += 1;
                Ok(())
            }
            None => Err(StoreError::Api {
                status: 404,
                message: format!("no record {}", handle.0),
            }),
        }
    }
}

/// Keeps every published document; optionally refuses to publish.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<String>>,
    fail_with: Option<String>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            fail_with: Some(message.into()),
        }
    }

    pub fn published(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl DocumentPublisher for RecordingPublisher {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn publish(&self, content: &str) -> Result<(), StoreError> {
        if let Some(message) = &self.fail_with {
            return Err(StoreError::Config(message.clone()));
        }
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(content.to_string());
        Ok(())
    }
}
