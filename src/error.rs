//! Run-terminating error conditions.
//!
//! Everything else the engine encounters (orphaned records, out-of-window dates, malformed
//! lines, unusable files) is counted and logged instead of failing the run. These variants
//! travel inside `anyhow::Error`; callers can recover them with `downcast_ref`.

use crate::ident::SubjectKey;
use crate::schema::RecordType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Two subject lines share the same `(subset, identifier)` pair.
    #[error("duplicate subject identifier {0}")]
    DuplicateSubject(SubjectKey),

    /// A subject line sorts before its predecessor in a stream assumed to be sorted.
    #[error("subject {current} appears after {previous}; input is not sorted")]
    SubjectOutOfOrder {
        previous: SubjectKey,
        current: SubjectKey,
    },

    /// No usable file of a required type was selected.
    #[error("no usable {0} file selected")]
    MissingRequiredFile(RecordType),

    /// More than one usable file of the same type was found.
    #[error("more than one {0} file found: {1} and {2}")]
    MultipleFilesForType(RecordType, String, String),

    /// Configuration values that cannot drive a run.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
