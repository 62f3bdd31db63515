//! JSON file store: one pretty-printed file per submission.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use cap_std::{ambient_authority, fs::Dir};
use tracing::debug;
use uuid::Uuid;

use super::validate_table;
use crate::domain::form::FieldMap;
use crate::domain::ports::{StoredRecord, SubmissionStore, SubmissionStoreError};

/// Stores each record as `<root>/<table>/<id>.json`.
///
/// Files are staged under a dot-prefixed name and renamed into place, so
/// readers never observe a partially written record.
#[derive(Clone)]
pub struct FileSubmissionStore {
    root: Arc<Dir>,
    root_path: PathBuf,
}

impl FileSubmissionStore {
    /// Open (creating if needed) the storage root.
    pub fn open(root: impl AsRef<Path>) -> io::Result<Self> {
        let root_path = root.as_ref().to_path_buf();
        Dir::create_ambient_dir_all(&root_path, ambient_authority())?;
        let dir = Dir::open_ambient_dir(&root_path, ambient_authority())?;
        Ok(Self {
            root: Arc::new(dir),
            root_path,
        })
    }

    /// Storage root on disk.
    pub fn root(&self) -> &Path {
        &self.root_path
    }
}

#[async_trait]
impl SubmissionStore for FileSubmissionStore {
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
        let encoded = serde_json::to_vec_pretty(&record)
            .map_err(|err| SubmissionStoreError::encoding(err.to_string()))?;

        let root = Arc::clone(&self.root);
        let table_name = table.to_owned();
        let id = record.id.clone().unwrap_or_default();
        tokio::task::spawn_blocking(move || write_record(&root, &table_name, &id, &encoded))
            .await
            .map_err(|err| SubmissionStoreError::io(err.to_string()))?
            .map_err(|err| SubmissionStoreError::io(err.to_string()))?;

        debug!(table, id = record.id.as_deref(), "submission written");
        Ok(record)
    }
}

fn write_record(root: &Dir, table: &str, id: &str, encoded: &[u8]) -> io::Result<()> {
    root.create_dir_all(table)?;
    let staged = Path::new(table).join(format!(".{id}.json.tmp"));
    let target = Path::new(table).join(format!("{id}.json"));
    root.write(&staged, encoded)?;
    root.rename(&staged, root, &target).inspect_err(|_| {
        let _cleanup = root.remove_file(&staged);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::form::FieldValue;
    use serde_json::json;
    use tempfile::TempDir;

    fn fields() -> FieldMap {
        FieldMap::from([
            ("name".to_owned(), FieldValue::from("ann")),
            ("year".to_owned(), FieldValue::from(2024)),
        ])
    }

    #[tokio::test]
    async fn writes_one_json_file_per_record() {
        let tmp = TempDir::new().expect("tempdir");
        let store = FileSubmissionStore::open(tmp.path().join("results")).expect("open store");

        let record = store.store("signup", &fields()).await.expect("stored");
        let id = record.id.clone().expect("id assigned");

        let path = store.root().join("signup").join(format!("{id}.json"));
        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(path).expect("file exists")).expect("json");
        assert_eq!(written, json!({"ID": id, "name": "ann", "year": 2024}));
    }

    #[tokio::test]
    async fn leaves_no_staging_files_behind() {
        let tmp = TempDir::new().expect("tempdir");
        let store = FileSubmissionStore::open(tmp.path()).expect("open store");
        store.store("signup", &fields()).await.expect("first");
        store.store("signup", &fields()).await.expect("second");

        let names: Vec<String> = std::fs::read_dir(tmp.path().join("signup"))
            .expect("table dir")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|name| name.ends_with(".json") && !name.starts_with('.')));
    }

    #[tokio::test]
    async fn rejects_path_traversal() {
        let tmp = TempDir::new().expect("tempdir");
        let store = FileSubmissionStore::open(tmp.path()).expect("open store");
        let err = store.store("../escape", &fields()).await.expect_err("invalid table");
        assert_eq!(err, SubmissionStoreError::invalid_table("../escape"));
    }
}
