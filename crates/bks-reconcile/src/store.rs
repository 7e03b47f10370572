//! External record store boundary.
//!
//! The synchronizer sees a store only through [`RecordStore`]: a paginated
//! key listing, create, and full-overwrite update. Handles and cursors are
//! opaque strings owned by the adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::NaturalKey;

/// Typed field value; adapters map each variant onto their own wire shape.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// The record's title / key column.
    Title(String),
    Text(String),
    Select(String),
    Number(f64),
    Date(DateTime<Utc>),
}

/// Ordered field set. Order is significant for column-oriented stores.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordFields {
    entries: Vec<(String, FieldValue)>,
}

impl RecordFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field, replacing an earlier value with the same name in place.
    pub fn with(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: FieldValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A record ready for synchronization.
#[derive(Clone, Debug, PartialEq)]
pub struct SyncRecord {
    pub key: NaturalKey,
    pub fields: RecordFields,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordHandle(pub String);

impl std::fmt::Display for RecordHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Continuation token returned by a page that has more results.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cursor(pub String);

/// One listed record: handle plus the natural key read from its key field
/// (`None` when the record has no key).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalRecord {
    pub handle: RecordHandle,
    pub key: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Page {
    pub records: Vec<ExternalRecord>,
    pub next_cursor: Option<Cursor>,
}

/// Scope of an index build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryFilter {
    /// Store-specific collection id (database id, sheet name).
    pub collection: String,
    /// Field holding the natural key.
    pub key_field: String,
    pub page_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Network or timeout failure.
    Transport(String),
    /// The store answered with a non-success status.
    Api { status: u16, message: String },
    /// A response could not be decoded.
    Decode(String),
    /// Missing or invalid adapter configuration.
    Config(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Transport(msg) => write!(f, "store transport error: {msg}"),
            StoreError::Api { status, message } => {
                write!(f, "store api error status={status}: {message}")
            }
            StoreError::Decode(msg) => write!(f, "store decode error: {msg}"),
            StoreError::Config(msg) => write!(f, "store config error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Paginated external record store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// One page of records in `filter.collection`, starting at `cursor`
    /// (`None` = first page).
    async fn query_page(
        &self,
        filter: &QueryFilter,
        cursor: Option<&Cursor>,
    ) -> Result<Page, StoreError>;

    async fn create_record(
        &self,
        collection: &str,
        fields: &RecordFields,
    ) -> Result<RecordHandle, StoreError>;

    /// Overwrite every field in `fields` on the record behind `handle`.
    async fn update_record(
        &self,
        handle: &RecordHandle,
        fields: &RecordFields,
    ) -> Result<(), StoreError>;
}

/// Single-document target that is overwritten wholesale (account summary).
#[async_trait]
pub trait DocumentPublisher: Send + Sync {
    fn name(&self) -> &'static str;

    async fn publish(&self, content: &str) -> Result<(), StoreError>;
}
