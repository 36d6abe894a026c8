use std::sync::atomic::{AtomicU64, Ordering};

use log::trace;
use model::FullTransactionId;

/// Process-wide watermark: the oldest transaction, with epoch, that may still have undo in any log.
///
/// Transactions older than the watermark have no undo left, so visibility checks may skip looking for it.
/// The value never moves backwards.
///
/// The discard worker is the only writer. [`OldestXidHavingUndo::publish`] is a plain load followed by a store,
/// which is only correct with a single writer; concurrent discard workers would need a compare-and-swap loop.
#[derive(Debug, Default)]
pub struct OldestXidHavingUndo {
    value: AtomicU64,
}

impl OldestXidHavingUndo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> FullTransactionId {
        FullTransactionId::from_raw(self.value.load(Ordering::Acquire))
    }

    /// Returns the value in effect after the call.
    pub(crate) fn publish(&self, candidate: FullTransactionId) -> FullTransactionId {
        let current = self.load();
        if candidate.follows(current) {
            self.value.store(candidate.raw(), Ordering::Release);
            trace!("Published oldest xid having undo {candidate}, was {current}");
            candidate
        } else {
            current
        }
    }
}

#[cfg(test)]
mod tests {
    use model::{FullTransactionId, TransactionId};

    use super::OldestXidHavingUndo;

    #[test]
    fn test_publish_never_regresses() {
        let watermark = OldestXidHavingUndo::new();
        assert_eq!(FullTransactionId::default(), watermark.load());

        let first = FullTransactionId::new(0, TransactionId::new(100));
        assert_eq!(first, watermark.publish(first));

        let older = FullTransactionId::new(0, TransactionId::new(50));
        assert_eq!(first, watermark.publish(older));
        assert_eq!(first, watermark.load());

        let next_epoch = FullTransactionId::new(1, TransactionId::new(4));
        assert_eq!(next_epoch, watermark.publish(next_epoch));
        assert_eq!(next_epoch, watermark.load());
    }
}
