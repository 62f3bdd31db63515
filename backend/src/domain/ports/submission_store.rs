//! Driven port for persisting validated submissions.

use async_trait::async_trait;
use serde::Serialize;

use super::define_port_error;
use crate::domain::form::FieldMap;

define_port_error! {
    /// Errors raised by storage adapters.
    pub enum SubmissionStoreError {
        /// The table name cannot be mapped onto the backing store.
        InvalidTable { table: String } => "invalid storage table `{table}`",
        /// The backing store could not be written.
        Io { message: String } => "storage write failed: {message}",
        /// The record could not be encoded.
        Encoding { message: String } => "storage encoding failed: {message}",
    }
}

/// Record as persisted by the store.
///
/// Serialises as one flat JSON object: the submitted fields plus the
/// generated `ID` when the store assigns one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRecord {
    /// Identifier assigned by the store.
    #[serde(rename = "ID", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Stored field values.
    #[serde(flatten)]
    pub fields: FieldMap,
}

/// Port for writing one submission into a table or collection.
///
/// Implementations must tolerate concurrent calls for different submissions;
/// only single-record atomicity is expected.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Persist `fields` into `table` and return the stored record.
    async fn store(
        &self,
        table: &str,
        fields: &FieldMap,
    ) -> Result<StoredRecord, SubmissionStoreError>;
}
