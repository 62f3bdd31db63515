//! In-process store for development and tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use super::validate_table;
use crate::domain::form::FieldMap;
use crate::domain::ports::{StoredRecord, SubmissionStore, SubmissionStoreError};

/// Keeps records in memory, grouped by table. Contents are lost on restart.
#[derive(Clone, Default)]
pub struct MemorySubmissionStore {
    tables: Arc<Mutex<HashMap<String, Vec<StoredRecord>>>>,
}

impl MemorySubmissionStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record stored in `table`, oldest first.
    pub fn records(&self, table: &str) -> Vec<StoredRecord> {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables.get(table).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl SubmissionStore for MemorySubmissionStore {
    async fn store(
        &self,
        table: &str,
        fields: &FieldMap,
    ) -> Result<StoredRecord, SubmissionStoreError> {
        validate_table(table)?;
        let record = StoredRecord {
            id: Some(Uuid::new_v4().to_string()),
            fields: fields.clone(),
        };
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables
            .entry(table.to_owned())
            .or_default()
            .push(record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::form::FieldValue;

    #[tokio::test]
    async fn records_are_grouped_by_table() {
        let store = MemorySubmissionStore::new();
        let fields = FieldMap::from([("name".to_owned(), FieldValue::from("ann"))]);
        let first = store.store("signup", &fields).await.expect("stored");
        store.store("feedback", &fields).await.expect("stored");

        let signups = store.records("signup");
        assert_eq!(signups, vec![first]);
        assert_eq!(store.records("feedback").len(), 1);
        assert!(store.records("missing").is_empty());
    }

    #[tokio::test]
    async fn assigns_distinct_ids() {
        let store = MemorySubmissionStore::new();
        let a = store.store("t", &FieldMap::new()).await.expect("a");
        let b = store.store("t", &FieldMap::new()).await.expect("b");
        assert_ne!(a.id, b.id);
    }
}
