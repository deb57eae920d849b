//! Error taxonomy shared by the reconciliation and rendering pipeline.
//!
//! Only [`LedgerError::BackendWriteFailure`] aborts a whole run. Schema
//! conflicts abort one section, fetch failures drop one source from a section,
//! and missing required fields drop one record. Thumbnail lookups never
//! surface an error at all.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("schema conflict: {0}")]
    SchemaConflict(String),

    #[error("record from '{source_name}' is missing required field '{key}'")]
    MissingRequiredField { key: String, source_name: String },

    #[error("fetching '{section}' records from '{source_name}' failed: {message}")]
    SourceFetchFailure {
        source_name: String,
        section: String,
        message: String,
    },

    #[error("writing report to {path:?} failed: {message}")]
    BackendWriteFailure { path: PathBuf, message: String },
}

impl LedgerError {
    pub fn conflict(message: impl Into<String>) -> Self {
        LedgerError::SchemaConflict(message.into())
    }
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;
