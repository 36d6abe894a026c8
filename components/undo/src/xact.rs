#[cfg(any(test, feature = "mock"))]
use mockall::automock;

use model::{Epoch, TransactionId};

/// Transaction status lookups needed to decide whether undo must be replayed.
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait TransactionStatus: Send + Sync {
    fn did_commit(&self, xid: TransactionId) -> bool;

    /// Epoch of `xid`, relative to the current transaction id horizon.
    fn epoch_for_xid(&self, xid: TransactionId) -> Epoch;
}
