//! Create-or-update synchronizer.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{ExternalRecordIndex, RecordStore, SyncRecord};

/// What to do when a record's key is already in the store.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    /// Overwrite every field of the existing record.
    #[default]
    Upsert,
    /// Leave the existing record untouched.
    AppendOnly,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failed_keys: Vec<String>,
}

impl SyncReport {
    pub fn processed(&self) -> usize {
        self.created + self.updated + self.skipped + self.failed
    }
}

/// Write `records` into `collection`, one call per record, in input order.
///
/// A failed create/update is counted and the batch continues. Created
/// handles are inserted into `index`, so a key repeated within `records`
/// is created at most once.
pub async fn synchronize<S>(
    store: &S,
    collection: &str,
    records: &[SyncRecord],
    index: &mut ExternalRecordIndex,
    policy: WritePolicy,
) -> SyncReport
where
    S: RecordStore + ?Sized,
{
    let mut report = SyncReport::default();

    for record in records {
        let key = record.key.as_str();
        match (index.get(key).cloned(), policy) {
            (Some(_), WritePolicy::AppendOnly) => {
                debug!(store = store.name(), key, "already present; skipped");
                report.skipped += 1;
            }
            (Some(handle), WritePolicy::Upsert) => {
                match store.update_record(&handle, &record.fields).await {
                    Ok(()) => {
                        debug!(store = store.name(), key, handle = %handle, "updated");
                        report.updated += 1;
                    }
                    Err(err) => {
                        warn!(store = store.name(), key, handle = %handle, error = %err, "update failed");
                        report.failed += 1;
                        report.failed_keys.push(key.to_string());
                    }
                }
            }
            (None, _) => match store.create_record(collection, &record.fields).await {
                Ok(handle) => {
                    debug!(store = store.name(), key, handle = %handle, "created");
                    index.insert(key, handle);
                    report.created += 1;
                }
                Err(err) => {
                    warn!(store = store.name(), key, error = %err, "create failed");
                    report.failed += 1;
                    report.failed_keys.push(key.to_string());
                }
            },
        }
    }

    info!(
        store = store.name(),
        collection,
        created = report.created,
        updated = report.updated,
        skipped = report.skipped,
        failed = report.failed,
        "synchronization finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Cursor, FieldValue, NaturalKey, Page, QueryFilter, RecordFields, RecordHandle, StoreError,
    };
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        fail_keys: BTreeSet<String>,
        creates: Mutex<Vec<String>>,
        updates: Mutex<Vec<(String, String)>>,
    }

    fn key_of(fields: &RecordFields) -> String {
        match fields.get("id") {
            Some(FieldValue::Title(k)) => k.clone(),
            _ => String::new(),
        }
    }

    #[async_trait]
    impl RecordStore for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }
        async fn query_page(
            &self,
            _filter: &QueryFilter,
            _cursor: Option<&Cursor>,
        ) -> Result<Page, StoreError> {
            Ok(Page::default())
        }
        async fn create_record(
            &self,
            _collection: &str,
            fields: &RecordFields,
        ) -> Result<RecordHandle, StoreError> {
            let key = key_of(fields);
            if self.fail_keys.contains(&key) {
                return Err(StoreError::Api {
                    status: 400,
                    message: "validation_error".to_string(),
                });
            }
            let mut creates = self.creates.lock().unwrap();
            creates.push(key);
            Ok(RecordHandle(format!("new-{}", creates.len())))
        }
        async fn update_record(
            &self,
            handle: &RecordHandle,
            fields: &RecordFields,
        ) -> Result<(), StoreError> {
            let key = key_of(fields);
            if self.fail_keys.contains(&key) {
                return Err(StoreError::Transport("timeout".to_string()));
            }
            self.updates.lock().unwrap().push((handle.0.clone(), key));
            Ok(())
        }
    }

    fn record(key: &str, qty: f64) -> SyncRecord {
        SyncRecord {
            key: NaturalKey::new(key),
            fields: RecordFields::new()
                .with("id", FieldValue::Title(key.to_string()))
                .with("qty", FieldValue::Number(qty)),
        }
    }

    #[tokio::test]
    async fn present_keys_update_and_absent_keys_create() {
        let store = Recorder::default();
        let mut index = ExternalRecordIndex::new();
        index.insert("A", RecordHandle("h-a".to_string()));

        let report = synchronize(
            &store,
            "db",
            &[record("A", 1.0), record("B", 2.0)],
            &mut index,
            WritePolicy::Upsert,
        )
        .await;

        assert_eq!(report.created, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(
            *store.updates.lock().unwrap(),
            vec![("h-a".to_string(), "A".to_string())]
        );
        assert_eq!(*store.creates.lock().unwrap(), vec!["B".to_string()]);
        assert!(index.contains("B"));
    }

    #[tokio::test]
    async fn one_failing_record_does_not_abort_the_batch() {
        let store = Recorder {
            fail_keys: ["B".to_string()].into_iter().collect(),
            ..Recorder::default()
        };
        let mut index = ExternalRecordIndex::new();
        let records = [record("A", 1.0), record("B", 2.0), record("C", 3.0)];

        let report = synchronize(&store, "db", &records, &mut index, WritePolicy::Upsert).await;

        assert_eq!(report.created, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failed_keys, vec!["B".to_string()]);
        assert!(!index.contains("B"));
        assert_eq!(report.processed(), 3);
    }

    #[tokio::test]
    async fn repeated_key_in_one_batch_is_created_once() {
        let store = Recorder::default();
        let mut index = ExternalRecordIndex::new();

        let report = synchronize(
            &store,
            "db",
            &[record("A", 1.0), record("A", 5.0)],
            &mut index,
            WritePolicy::Upsert,
        )
        .await;

        assert_eq!(report.created, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(store.creates.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn append_only_skips_existing_keys() {
        let store = Recorder::default();
        let mut index = ExternalRecordIndex::new();
        index.insert("T1", RecordHandle("row-2".to_string()));

        let report = synchronize(
            &store,
            "sheet",
            &[record("T1", 10.0), record("T2", 5.0)],
            &mut index,
            WritePolicy::AppendOnly,
        )
        .await;

        assert_eq!(report.skipped, 1);
        assert_eq!(report.created, 1);
        assert_eq!(report.updated, 0);
        assert!(store.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn padded_local_key_matches_trimmed_index_entry() {
        let store = Recorder::default();
        let mut index = ExternalRecordIndex::new();
        index.insert("A", RecordHandle("h-a".to_string()));

        let report = synchronize(
            &store,
            "db",
            &[record(" A \t", 1.0)],
            &mut index,
            WritePolicy::Upsert,
        )
        .await;

        assert_eq!((report.created, report.updated), (0, 1));
        assert!(store.creates.lock().unwrap().is_empty());
    }
}
