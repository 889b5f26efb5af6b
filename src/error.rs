//! # Error Taxonomy
//!
//! Typed error values for the cursor engine. All fallible operations return
//! `eyre::Result`; the enums here ride inside the `eyre::Report` and are
//! recovered with `Report::downcast_ref` where callers need to branch on the
//! failure kind.
//!
//! ## Propagation policy
//!
//! - Validation and permission errors are raised immediately and never
//!   retried internally.
//! - `try_*` operations return `bool`/`Option` for the not-found/duplicate
//!   outcomes; the non-`try` wrappers raise [`CursorError::RecordNotFound`]
//!   or [`CursorError::DuplicateRecord`] on the negative case.
//! - [`CursorError::ConcurrentModification`] is produced by pattern-matching
//!   a [`BackendRejection::VersionConflict`] and re-raised with the record
//!   key attached. It is never silently retried.
//! - `close()` is best-effort and must not raise for an already-closed
//!   resource.

use thiserror::Error;

/// Failure kinds surfaced by cursors and sessions.
#[derive(Debug, Error)]
pub enum CursorError {
    /// Malformed navigation command, negative skip, duplicate order column,
    /// filter referencing an unknown or type-mismatched column, and similar
    /// caller mistakes.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The session's access policy denied an action on a schema object.
    #[error("permission denied: {action} on {object}")]
    PermissionDenied {
        action: &'static str,
        object: String,
    },

    /// Strict get/find/first/last found no matching row.
    #[error("record not found in {object}")]
    RecordNotFound { object: String },

    /// Strict insert collided with an existing row.
    #[error("record already exists in {object}: {key}")]
    DuplicateRecord { object: String, key: String },

    /// The version precondition failed on update or delete; another writer
    /// committed a change after this cursor last read the row.
    #[error("record in {object} was changed by another user: {key}")]
    ConcurrentModification { object: String, key: String },

    /// A complex filter expression failed to parse or referenced a column
    /// the cursor's schema view does not contain.
    #[error("invalid filter expression: {0}")]
    InvalidFilterExpression(String),

    /// A fields lookup referenced missing columns or does not match any
    /// index on the partner cursor, or its partner is gone.
    #[error("invalid lookup: {0}")]
    InvalidLookup(String),

    /// Operation attempted on a closed cursor or session.
    #[error("operation on closed {0}")]
    ClosedResource(&'static str),

    /// Opaque failure surfaced from the storage layer.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Structured rejections a backend reports instead of row results.
///
/// Cursors pattern-match these out of the backend's error report and
/// translate them into [`CursorError`] values carrying record context.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BackendRejection {
    /// The stored version token did not match the precondition.
    #[error("version precondition failed")]
    VersionConflict,

    /// An insert collided with an existing key.
    #[error("duplicate key")]
    DuplicateKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_error_survives_eyre_downcast() {
        let report = eyre::Report::new(CursorError::Validation("bad command".into()));
        let err = report.downcast_ref::<CursorError>();
        assert!(matches!(err, Some(CursorError::Validation(m)) if m == "bad command"));
    }

    #[test]
    fn backend_rejection_survives_eyre_downcast() {
        let report = eyre::Report::new(BackendRejection::VersionConflict);
        assert_eq!(
            report.downcast_ref::<BackendRejection>(),
            Some(&BackendRejection::VersionConflict)
        );
    }

    #[test]
    fn messages_name_the_subject() {
        let err = CursorError::PermissionDenied {
            action: "Insert",
            object: "orders".into(),
        };
        assert_eq!(err.to_string(), "permission denied: Insert on orders");
    }
}
