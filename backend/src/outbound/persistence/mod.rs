//! Submission storage adapters.
//!
//! # Architecture
//!
//! - **Thin adapters**: stores only translate between [`FieldMap`] values and
//!   their backing medium. Validation and notification stay in the domain.
//! - **One record per write**: each call persists a single submission; no
//!   cross-record transactions are offered.
//! - **Strongly typed errors**: I/O and encoding failures map onto
//!   [`SubmissionStoreError`].
//!
//! # Example
//!
//! ```ignore
//! use web_form::outbound::persistence::FileSubmissionStore;
//!
//! let store = FileSubmissionStore::open("results")?;
//! let record = store.store("signup", &fields).await?;
//! ```
//!
//! [`FieldMap`]: crate::domain::form::FieldMap
//! [`SubmissionStoreError`]: crate::domain::ports::SubmissionStoreError

mod file_store;
mod memory_store;

pub use file_store::FileSubmissionStore;
pub use memory_store::MemorySubmissionStore;

use crate::domain::ports::SubmissionStoreError;

/// Reject table names that could escape the storage root or hide files.
fn validate_table(table: &str) -> Result<(), SubmissionStoreError> {
    let valid = !table.is_empty()
        && !table.starts_with('.')
        && table
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(SubmissionStoreError::invalid_table(table))
    }
}
