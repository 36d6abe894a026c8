#[cfg(any(test, feature = "mock"))]
use mockall::automock;

use model::{TransactionId, UndoLogNumber, UndoRecPtr};

use crate::error::DiscardError;

/// Undo log storage engine, as seen by the discard worker.
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait UndoLogStorage: Send + Sync {
    /// Insert position of the log if `xid` is still the transaction that last wrote to it; `None` once a newer
    /// transaction has started writing there.
    fn next_insert_ptr(&self, logno: UndoLogNumber, xid: TransactionId) -> Option<UndoRecPtr>;

    /// Oldest record still physically present in the log, `None` if the log holds no records.
    fn first_valid_record(&self, logno: UndoLogNumber) -> Option<UndoRecPtr>;

    /// Whether the record at `ptr` has been physically discarded, including when its whole log is gone.
    fn is_discarded(&self, ptr: UndoRecPtr) -> bool;

    /// Length of the record most recently inserted into the log.
    fn prev_len(&self, logno: UndoLogNumber) -> u16;

    /// Physically drop everything of `ptr`'s log before `ptr`. `xid` is the newest transaction whose undo is
    /// dropped, [`TransactionId::INVALID`] when no transaction is attributed.
    fn discard(&self, ptr: UndoRecPtr, xid: TransactionId) -> Result<(), DiscardError>;
}
