//! bks-reconcile
//!
//! Idempotent synchronization of canonical records into an external store:
//! - natural keys derived from stable attributes only
//! - the `RecordStore` capability (paginated query, create, update)
//! - identity index built by full pagination on every run
//! - create-or-update synchronizer with per-record failure isolation
//!
//! No HTTP here; adapters implement [`RecordStore`] in their own crates.

mod index;
mod keys;
mod records;
mod store;
mod upsert;

pub use index::{build_index, ExternalRecordIndex, IndexBuildError};
pub use keys::{position_key, trade_key, NaturalKey};
pub use records::{
    position_record, trade_record, POSITION_KEY_FIELD, TRADE_COLUMNS, TRADE_KEY_FIELD,
};
pub use store::{
    Cursor, DocumentPublisher, ExternalRecord, FieldValue, Page, QueryFilter, RecordFields,
    RecordHandle, RecordStore, StoreError, SyncRecord,
};
pub use upsert::{synchronize, SyncReport, WritePolicy};
