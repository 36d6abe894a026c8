use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use log::{debug, info};
use model::{Epoch, TransactionId, UndoLogNumber, UndoLogOffset, UndoPersistence, UndoRecPtr};
use parking_lot::RwLock;

/// Discard state of one undo log.
///
/// `oldest_xid`, when valid, owns the record at `oldest_data`. `oldest_data` is `None` until the first discard pass
/// locates the first record of the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiscardInfo {
    pub oldest_xid: TransactionId,
    pub oldest_xid_epoch: Epoch,
    pub oldest_data: Option<UndoRecPtr>,
}

/// In-memory control block of an undo log.
///
/// Readers take the discard lock in shared mode; the discard worker is the only writer and holds it exclusively just
/// long enough to assign a new [`DiscardInfo`].
#[derive(Debug)]
pub struct UndoLogControl {
    logno: UndoLogNumber,
    persistence: UndoPersistence,

    /// Append frontier, maintained by the storage layer.
    insert: AtomicU64,

    discard: RwLock<DiscardInfo>,
}

impl UndoLogControl {
    pub fn new(logno: UndoLogNumber, persistence: UndoPersistence, insert: UndoLogOffset) -> Self {
        Self {
            logno,
            persistence,
            insert: AtomicU64::new(insert),
            discard: RwLock::new(DiscardInfo::default()),
        }
    }

    pub fn logno(&self) -> UndoLogNumber {
        self.logno
    }

    pub fn persistence(&self) -> UndoPersistence {
        self.persistence
    }

    pub fn insert(&self) -> UndoLogOffset {
        self.insert.load(Ordering::Acquire)
    }

    pub fn insert_ptr(&self) -> UndoRecPtr {
        UndoRecPtr::new(self.logno, self.insert())
    }

    /// Move the append frontier. It may move backwards when an aborted transaction rewinds its undo, but never
    /// below the discard pointer.
    pub fn set_insert(&self, offset: UndoLogOffset) {
        debug_assert!(
            self.oldest_data()
                .map_or(true, |ptr| ptr.offset() <= offset),
            "Insert position rewound below discard pointer"
        );
        self.insert.store(offset, Ordering::Release);
    }

    /// Consistent snapshot of the discard state.
    pub fn discard_info(&self) -> DiscardInfo {
        *self.discard.read()
    }

    pub fn oldest_data(&self) -> Option<UndoRecPtr> {
        self.discard.read().oldest_data
    }

    pub fn oldest_xid(&self) -> TransactionId {
        self.discard.read().oldest_xid
    }

    /// Whether `ptr`, which must belong to this log, has already been discarded.
    pub fn is_discarded(&self, ptr: UndoRecPtr) -> bool {
        debug_assert_eq!(self.logno, ptr.logno());
        match self.discard.read().oldest_data {
            Some(oldest) => ptr < oldest,
            None => false,
        }
    }

    /// Point the discard pointer at the first record of a log whose owner transaction is not known yet. The pointer
    /// never moves backwards, even if storage still holds records below it.
    pub(crate) fn bootstrap(&self, first: UndoRecPtr) {
        debug_assert_eq!(self.logno, first.logno());
        let mut info = self.discard.write();
        info.oldest_data = Some(info.oldest_data.map_or(first, |oldest| oldest.max(first)));
    }

    pub(crate) fn update_discard_info(&self, next: DiscardInfo) -> DiscardInfo {
        let mut info = self.discard.write();
        std::mem::replace(&mut *info, next)
    }
}

/// Registry of live undo logs, iterated in ascending log number.
#[derive(Debug, Default)]
pub struct UndoLogs {
    logs: RwLock<BTreeMap<UndoLogNumber, Arc<UndoLogControl>>>,
}

impl UndoLogs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a log on its first write. Registering a log number twice returns the existing control block.
    pub fn register(
        &self,
        logno: UndoLogNumber,
        persistence: UndoPersistence,
        insert: UndoLogOffset,
    ) -> Arc<UndoLogControl> {
        let mut logs = self.logs.write();
        Arc::clone(logs.entry(logno).or_insert_with(|| {
            debug!("Register undo log {logno}, persistence={persistence:?}, insert={insert}");
            Arc::new(UndoLogControl::new(logno, persistence, insert))
        }))
    }

    pub fn get(&self, logno: UndoLogNumber) -> Option<Arc<UndoLogControl>> {
        self.logs.read().get(&logno).cloned()
    }

    /// Drop a log that the storage layer has physically retired.
    pub fn retire(&self, logno: UndoLogNumber) -> Option<Arc<UndoLogControl>> {
        let removed = self.logs.write().remove(&logno);
        if removed.is_some() {
            info!("Retired undo log {logno}");
        }
        removed
    }

    /// Control blocks of all live logs. Logs registered after the call are not included.
    pub fn snapshot(&self) -> Vec<Arc<UndoLogControl>> {
        self.logs.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.logs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use model::{TransactionId, UndoPersistence, UndoRecPtr};

    use super::{DiscardInfo, UndoLogs};

    #[test]
    fn test_register_and_iterate() {
        let logs = UndoLogs::new();
        logs.register(3, UndoPersistence::Permanent, 0);
        logs.register(1, UndoPersistence::Temporary, 0);
        let first = logs.register(2, UndoPersistence::Unlogged, 64);
        let again = logs.register(2, UndoPersistence::Unlogged, 128);
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(64, again.insert());

        let order: Vec<_> = logs.snapshot().iter().map(|log| log.logno()).collect();
        assert_eq!(vec![1, 2, 3], order);

        assert!(logs.retire(2).is_some());
        assert!(logs.retire(2).is_none());
        assert!(logs.get(2).is_none());
        assert_eq!(2, logs.len());
        assert!(!logs.is_empty());
    }

    #[test]
    fn test_discard_info() {
        let logs = UndoLogs::new();
        let log = logs.register(5, UndoPersistence::Permanent, 100);
        assert_eq!(DiscardInfo::default(), log.discard_info());
        assert!(!log.is_discarded(UndoRecPtr::new(5, 0)));

        log.bootstrap(UndoRecPtr::new(5, 10));
        assert_eq!(Some(UndoRecPtr::new(5, 10)), log.oldest_data());
        assert!(!log.oldest_xid().is_valid());
        log.bootstrap(UndoRecPtr::new(5, 4));
        assert_eq!(Some(UndoRecPtr::new(5, 10)), log.oldest_data());

        let prev = log.update_discard_info(DiscardInfo {
            oldest_xid: TransactionId::new(42),
            oldest_xid_epoch: 1,
            oldest_data: Some(UndoRecPtr::new(5, 50)),
        });
        assert_eq!(Some(UndoRecPtr::new(5, 10)), prev.oldest_data);
        assert_eq!(TransactionId::new(42), log.oldest_xid());
        assert!(log.is_discarded(UndoRecPtr::new(5, 49)));
        assert!(!log.is_discarded(UndoRecPtr::new(5, 50)));
        assert_eq!(UndoRecPtr::new(5, 100), log.insert_ptr());

        log.set_insert(80);
        assert_eq!(80, log.insert());
    }

    #[test]
    fn test_concurrent_readers() {
        let logs = Arc::new(UndoLogs::new());
        let log = logs.register(1, UndoPersistence::Permanent, 1 << 20);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    let mut last = None;
                    for _ in 0..1000 {
                        let info = log.discard_info();
                        assert!(info.oldest_data >= last);
                        last = info.oldest_data;
                    }
                })
            })
            .collect();
        for offset in 0..1000u64 {
            log.update_discard_info(DiscardInfo {
                oldest_xid: TransactionId::new(3 + offset as u32),
                oldest_xid_epoch: 0,
                oldest_data: Some(UndoRecPtr::new(1, offset)),
            });
        }
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
