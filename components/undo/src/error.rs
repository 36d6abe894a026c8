//! Define error types for this crate.
//!
//! Errors are defined centrally in this module, following the rest of the workspace.
//!

use model::{TransactionId, UndoLogNumber, UndoRecPtr};
use thiserror::Error;

use crate::replay::UndoRange;

#[derive(Debug, Error)]
pub enum DiscardError {
    #[error("Undo log `{0}` is not registered")]
    LogNotFound(UndoLogNumber),

    #[error("Undo log `{0}` is not temporary")]
    NotTemporary(UndoLogNumber),

    #[error("Undo record at `{0}` is not available")]
    RecordNotFound(UndoRecPtr),

    #[error("Insert position of undo log `{logno}` is not attributable to transaction `{xid}`")]
    InsertPointerUnavailable {
        logno: UndoLogNumber,
        xid: TransactionId,
    },

    #[error("Chain tail of transaction `{xid}` in undo log `{logno}` kept moving after {attempts} refetches")]
    ChainTailUnstable {
        logno: UndoLogNumber,
        xid: TransactionId,
        attempts: u32,
    },

    #[error("Rollback of transaction `{xid}` over `{range}` failed")]
    Replay {
        xid: TransactionId,
        range: UndoRange,
        #[source]
        source: ReplayError,
    },

    #[error("Undo log storage failed")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl DiscardError {
    /// Whether the condition goes away by itself once concurrent writers make progress.
    pub fn is_transient(&self) -> bool {
        matches!(self, DiscardError::ChainTailUnstable { .. })
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReplayError {
    #[error("Undo record at `{0}` could not be applied")]
    Apply(UndoRecPtr),

    #[error("Replay aborted: `{0}`")]
    Aborted(String),
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::DiscardError;

    #[test]
    fn test_storage_error_keeps_source() {
        let cause = std::io::Error::new(std::io::ErrorKind::Other, "segment unlink failed");
        let err = DiscardError::Storage(Box::new(cause));
        assert!(!err.is_transient());
        assert_eq!(
            Some("segment unlink failed".to_owned()),
            err.source().map(|e| e.to_string())
        );
    }
}
