//! Identity index: natural key → store handle.
//!
//! Rebuilt from scratch by full pagination on every run. A build that fails
//! part-way returns [`IndexBuildError`] carrying what was accumulated; that
//! partial index must not be used for create-vs-update decisions, since any
//! key on an unread page would be created a second time.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::{Cursor, NaturalKey, QueryFilter, RecordHandle, RecordStore, StoreError};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExternalRecordIndex {
    entries: BTreeMap<String, RecordHandle>,
    duplicates: Vec<(String, RecordHandle)>,
    unkeyed: usize,
    pages_fetched: usize,
}

impl ExternalRecordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&RecordHandle> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Register `handle` for `key`. The first handle seen for a key wins;
    /// later ones are kept aside as duplicates and returned as `false`.
    pub fn insert(&mut self, key: impl Into<String>, handle: RecordHandle) -> bool {
        let key = key.into();
        if self.entries.contains_key(&key) {
            self.duplicates.push((key, handle));
            return false;
        }
        self.entries.insert(key, handle);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Records sharing a key with an earlier record (store-side duplicates).
    pub fn duplicates(&self) -> &[(String, RecordHandle)] {
        &self.duplicates
    }

    /// Listed records that carried no key.
    pub fn unkeyed(&self) -> usize {
        self.unkeyed
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }
}

/// Pagination aborted; `partial` holds every page read before `page`.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexBuildError {
    pub partial: ExternalRecordIndex,
    /// Zero-based number of the page that failed.
    pub page: usize,
    pub source: StoreError,
}

impl std::fmt::Display for IndexBuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "index build aborted on page {} after {} keys: {}",
            self.page,
            self.partial.len(),
            self.source
        )
    }
}

impl std::error::Error for IndexBuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Page through `filter.collection` until the store reports no further pages.
pub async fn build_index<S>(
    store: &S,
    filter: &QueryFilter,
) -> Result<ExternalRecordIndex, IndexBuildError>
where
    S: RecordStore + ?Sized,
{
    let mut index = ExternalRecordIndex::new();
    let mut cursor: Option<Cursor> = None;

    loop {
        let page_no = index.pages_fetched;
        let page = match store.query_page(filter, cursor.as_ref()).await {
            Ok(page) => page,
            Err(source) => {
                warn!(
                    store = store.name(),
                    collection = %filter.collection,
                    page = page_no,
                    keys = index.len(),
                    error = %source,
                    "index build aborted"
                );
                return Err(IndexBuildError {
                    partial: index,
                    page: page_no,
                    source,
                });
            }
        };
        index.pages_fetched += 1;

        for record in page.records {
            match record
                .key
                .map(|k| NaturalKey::new(k).to_string())
                .filter(|k| !k.is_empty())
            {
                Some(key) => {
                    if !index.insert(key.clone(), record.handle.clone()) {
                        warn!(
                            store = store.name(),
                            key = %key,
                            handle = %record.handle,
                            "duplicate key in store; keeping first record"
                        );
                    }
                }
                None => index.unkeyed += 1,
            }
        }

        match page.next_cursor {
            Some(next) if cursor.as_ref() == Some(&next) => {
                let source = StoreError::Decode(format!("cursor '{}' did not advance", next.0));
                return Err(IndexBuildError {
                    partial: index,
                    page: page_no,
                    source,
                });
            }
            Some(next) => {
                debug!(store = store.name(), page = page_no, "index page read; more pending");
                cursor = Some(next);
            }
            None => break,
        }
    }

    info!(
        store = store.name(),
        collection = %filter.collection,
        keys = index.len(),
        pages = index.pages_fetched,
        duplicates = index.duplicates.len(),
        unkeyed = index.unkeyed,
        "identity index built"
    );
    Ok(index)
}
