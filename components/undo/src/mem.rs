//! In-memory collaborators, for running discard passes without a storage engine.
//!
//! [`MemUndoStore`] lays undo records out the way a real undo log does: a transaction's records are appended
//! contiguously, the first record of every transaction chunk is linked from the previous chunk head of the same log,
//! and a transaction moving on to another log links its last chunk head there, leaving the old log full.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU32, AtomicUsize, Ordering},
        Arc,
    },
};

use model::{
    Epoch, TransactionId, UndoLogNumber, UndoLogOffset, UndoPersistence, UndoRecPtr,
    UnpackedUndoRecord,
};
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    error::{DiscardError, ReplayError},
    record::UndoRecordAccess,
    registry::{UndoLogControl, UndoLogs},
    replay::{ExecutionContext, ResourceOwner, RollbackReplay, UndoRange},
    storage::UndoLogStorage,
    watermark::OldestXidHavingUndo,
    xact::TransactionStatus,
    UndoDiscarder,
};

#[derive(Debug, Default)]
struct LogState {
    /// Transaction that wrote the newest record.
    last_xid: TransactionId,

    /// Length of the newest record.
    prev_len: u16,

    /// Head of the newest transaction chunk.
    last_chunk: Option<UndoRecPtr>,

    /// Everything before this offset is physically gone.
    discarded: UndoLogOffset,

    /// A transaction overflowed from this log into another one.
    full: bool,
}

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<UndoRecPtr, UnpackedUndoRecord>,
    lengths: BTreeMap<UndoRecPtr, u16>,
    states: FxHashMap<UndoLogNumber, LogState>,

    /// Newest chunk head of every transaction.
    chunks: FxHashMap<TransactionId, UndoRecPtr>,

    discards: Vec<(UndoRecPtr, TransactionId)>,
}

impl Inner {
    fn link(&mut self, head: UndoRecPtr, next: UndoRecPtr) {
        if let Some(record) = self.records.get_mut(&head) {
            if record.next.is_none() {
                record.next = Some(next);
            }
        }
    }
}

/// In-memory undo log storage and record access.
#[derive(Debug)]
pub struct MemUndoStore {
    logs: Arc<UndoLogs>,
    inner: Mutex<Inner>,
    outstanding: AtomicUsize,
    fetches: AtomicUsize,
}

impl MemUndoStore {
    pub fn new(logs: Arc<UndoLogs>) -> Self {
        Self {
            logs,
            inner: Mutex::new(Inner::default()),
            outstanding: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn create_log(
        &self,
        logno: UndoLogNumber,
        persistence: UndoPersistence,
    ) -> Arc<UndoLogControl> {
        self.inner.lock().states.entry(logno).or_default();
        self.logs.register(logno, persistence, 0)
    }

    /// Append a record of `len` bytes written by `xid` and return its position.
    ///
    /// # Panics
    /// If the log is unknown or full. Both are mistakes in the calling test.
    pub fn append(
        &self,
        logno: UndoLogNumber,
        xid: TransactionId,
        xid_epoch: Epoch,
        len: u16,
    ) -> UndoRecPtr {
        let log = self
            .logs
            .get(logno)
            .unwrap_or_else(|| panic!("Undo log {logno} is not created"));
        let mut inner = self.inner.lock();
        let ptr = log.insert_ptr();

        let (prev_len, new_chunk, last_chunk) = {
            let state = inner.states.entry(logno).or_default();
            assert!(!state.full, "Undo log {logno} is full");
            (state.prev_len, state.last_xid != xid, state.last_chunk)
        };

        if new_chunk {
            if let Some(head) = last_chunk {
                inner.link(head, ptr);
            }
            if let Some(head) = inner.chunks.get(&xid).copied() {
                if !head.same_log(ptr) {
                    inner.link(head, ptr);
                    if let Some(state) = inner.states.get_mut(&head.logno()) {
                        state.full = true;
                    }
                }
            }
            inner.chunks.insert(xid, ptr);
        }

        inner.records.insert(
            ptr,
            UnpackedUndoRecord {
                xid,
                xid_epoch,
                next: None,
                prev_len,
            },
        );
        inner.lengths.insert(ptr, len);
        if let Some(state) = inner.states.get_mut(&logno) {
            state.prev_len = len;
            state.last_xid = xid;
            if new_chunk {
                state.last_chunk = Some(ptr);
            }
        }
        log.set_insert(ptr.offset() + len as UndoLogOffset);
        ptr
    }

    /// Drop every record from `to` on, as the rollback of the newest transaction does once its undo actions are
    /// applied, handing the log back to `restored`, the transaction that wrote before it.
    pub fn rewind(&self, to: UndoRecPtr, restored: TransactionId) {
        let logno = to.logno();
        let mut inner = self.inner.lock();
        let end = UndoRecPtr::new(logno, model::undo::UNDO_LOG_MAX_OFFSET);
        let dropped: Vec<_> = inner.records.range(to..=end).map(|(ptr, _)| *ptr).collect();
        for ptr in dropped.iter() {
            if let Some(record) = inner.records.remove(ptr) {
                if inner.chunks.get(&record.xid) == Some(ptr) {
                    inner.chunks.remove(&record.xid);
                }
            }
            inner.lengths.remove(ptr);
        }
        let prev_len = inner
            .lengths
            .range(UndoRecPtr::new(logno, 0)..to)
            .next_back()
            .map(|(_, len)| *len)
            .unwrap_or_default();
        let last_chunk = inner.chunks.get(&restored).copied();
        if let Some(state) = inner.states.get_mut(&logno) {
            state.last_xid = restored;
            state.prev_len = prev_len;
            state.last_chunk = last_chunk;
        }
        if let Some(log) = self.logs.get(logno) {
            log.set_insert(to.offset());
        }
    }

    /// Calls of [`UndoLogStorage::discard`] so far.
    pub fn discards(&self) -> Vec<(UndoRecPtr, TransactionId)> {
        self.inner.lock().discards.clone()
    }

    pub fn record(&self, ptr: UndoRecPtr) -> Option<UnpackedUndoRecord> {
        self.inner.lock().records.get(&ptr).copied()
    }

    /// Records fetched but not released yet.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::Acquire)
    }
}

impl UndoLogStorage for MemUndoStore {
    fn next_insert_ptr(&self, logno: UndoLogNumber, xid: TransactionId) -> Option<UndoRecPtr> {
        if !xid.is_valid() {
            return None;
        }
        let inner = self.inner.lock();
        let state = inner.states.get(&logno)?;
        if state.last_xid != xid {
            return None;
        }
        self.logs.get(logno).map(|log| log.insert_ptr())
    }

    fn first_valid_record(&self, logno: UndoLogNumber) -> Option<UndoRecPtr> {
        let inner = self.inner.lock();
        let discarded = inner.states.get(&logno)?.discarded;
        let end = UndoRecPtr::new(logno, model::undo::UNDO_LOG_MAX_OFFSET);
        inner
            .records
            .range(UndoRecPtr::new(logno, discarded)..=end)
            .next()
            .map(|(ptr, _)| *ptr)
    }

    fn is_discarded(&self, ptr: UndoRecPtr) -> bool {
        match self.inner.lock().states.get(&ptr.logno()) {
            Some(state) => ptr.offset() < state.discarded,
            None => true,
        }
    }

    fn prev_len(&self, logno: UndoLogNumber) -> u16 {
        self.inner
            .lock()
            .states
            .get(&logno)
            .map(|state| state.prev_len)
            .unwrap_or_default()
    }

    fn discard(&self, ptr: UndoRecPtr, xid: TransactionId) -> Result<(), DiscardError> {
        let logno = ptr.logno();
        let mut inner = self.inner.lock();
        let state = inner
            .states
            .get_mut(&logno)
            .ok_or(DiscardError::LogNotFound(logno))?;
        state.discarded = state.discarded.max(ptr.offset());
        let gone: Vec<_> = inner
            .records
            .range(UndoRecPtr::new(logno, 0)..ptr)
            .map(|(ptr, _)| *ptr)
            .collect();
        for ptr in gone {
            inner.records.remove(&ptr);
            inner.lengths.remove(&ptr);
        }
        inner.discards.push((ptr, xid));
        Ok(())
    }
}

impl UndoRecordAccess for MemUndoStore {
    fn fetch(&self, ptr: UndoRecPtr) -> Option<UnpackedUndoRecord> {
        let record = self.inner.lock().records.get(&ptr).copied();
        if record.is_some() {
            self.fetches.fetch_add(1, Ordering::AcqRel);
            self.outstanding.fetch_add(1, Ordering::AcqRel);
        }
        record
    }

    fn release(&self, _record: UnpackedUndoRecord) {
        let prev = self.outstanding.fetch_sub(1, Ordering::AcqRel);
        assert!(prev > 0, "Released more undo records than fetched");
    }
}

/// Commit log kept in memory; every transaction not marked committed counts as aborted.
#[derive(Debug, Default)]
pub struct MemTransactions {
    committed: RwLock<FxHashSet<TransactionId>>,
    epoch: AtomicU32,
}

impl MemTransactions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commit(&self, xid: TransactionId) {
        self.committed.write().insert(xid);
    }

    pub fn set_epoch(&self, epoch: Epoch) {
        self.epoch.store(epoch, Ordering::Release);
    }
}

impl TransactionStatus for MemTransactions {
    fn did_commit(&self, xid: TransactionId) -> bool {
        self.committed.read().contains(&xid)
    }

    fn epoch_for_xid(&self, _xid: TransactionId) -> Epoch {
        self.epoch.load(Ordering::Acquire)
    }
}

/// A replayed range, with the discard pointer of its first record's log at replay time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayCall {
    pub range: UndoRange,
    pub oldest_data: Option<UndoRecPtr>,
}

/// Replay engine that only records what it was asked to do.
#[derive(Debug)]
pub struct RecordingReplay {
    logs: Arc<UndoLogs>,
    calls: Mutex<Vec<ReplayCall>>,
    failing: Mutex<FxHashSet<UndoRecPtr>>,
    commits: AtomicUsize,
    aborts: AtomicUsize,
}

impl RecordingReplay {
    pub fn new(logs: Arc<UndoLogs>) -> Self {
        Self {
            logs,
            calls: Mutex::new(vec![]),
            failing: Mutex::new(FxHashSet::default()),
            commits: AtomicUsize::new(0),
            aborts: AtomicUsize::new(0),
        }
    }

    /// Make replays of the transaction chunk starting at `to` fail.
    pub fn fail_at(&self, to: UndoRecPtr) {
        self.failing.lock().insert(to);
    }

    pub fn heal(&self) {
        self.failing.lock().clear();
    }

    pub fn calls(&self) -> Vec<ReplayCall> {
        self.calls.lock().clone()
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::Acquire)
    }

    pub fn aborts(&self) -> usize {
        self.aborts.load(Ordering::Acquire)
    }

    fn end_transaction(context: &mut ExecutionContext) {
        context.set_in_transaction(false);
        context.set_resource_owner(None);
    }
}

impl RollbackReplay for RecordingReplay {
    fn start_transaction(&self, context: &mut ExecutionContext) {
        context.set_in_transaction(true);
        context.set_resource_owner(Some(ResourceOwner::Transaction));
    }

    fn execute_undo_actions(
        &self,
        context: &mut ExecutionContext,
        range: UndoRange,
    ) -> Result<(), ReplayError> {
        assert!(context.in_transaction(), "Undo actions outside of a transaction");
        if self.failing.lock().contains(&range.to) {
            return Err(ReplayError::Apply(range.from));
        }
        let oldest_data = self
            .logs
            .get(range.to.logno())
            .and_then(|log| log.oldest_data());
        self.calls.lock().push(ReplayCall { range, oldest_data });
        Ok(())
    }

    fn commit_transaction(&self, context: &mut ExecutionContext) {
        self.commits.fetch_add(1, Ordering::AcqRel);
        Self::end_transaction(context);
    }

    fn abort_transaction(&self, context: &mut ExecutionContext) {
        self.aborts.fetch_add(1, Ordering::AcqRel);
        Self::end_transaction(context);
    }
}

/// All in-memory collaborators wired around one registry.
#[derive(Debug)]
pub struct MemEnv {
    pub logs: Arc<UndoLogs>,
    pub store: Arc<MemUndoStore>,
    pub xact: Arc<MemTransactions>,
    pub replay: Arc<RecordingReplay>,
    pub watermark: Arc<OldestXidHavingUndo>,
}

impl MemEnv {
    pub fn new() -> Self {
        let logs = Arc::new(UndoLogs::new());
        Self {
            store: Arc::new(MemUndoStore::new(Arc::clone(&logs))),
            xact: Arc::new(MemTransactions::new()),
            replay: Arc::new(RecordingReplay::new(Arc::clone(&logs))),
            watermark: Arc::new(OldestXidHavingUndo::new()),
            logs,
        }
    }

    pub fn discarder(&self, config: config::Configuration) -> UndoDiscarder {
        UndoDiscarder::new(
            Arc::new(config),
            Arc::clone(&self.logs),
            Arc::clone(&self.store) as Arc<dyn UndoLogStorage>,
            Arc::clone(&self.store) as Arc<dyn UndoRecordAccess>,
            Arc::clone(&self.replay) as Arc<dyn RollbackReplay>,
            Arc::clone(&self.xact) as Arc<dyn TransactionStatus>,
            Arc::clone(&self.watermark),
        )
    }
}

impl Default for MemEnv {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use model::{TransactionId, UndoPersistence, UndoRecPtr};

    use super::MemEnv;
    use crate::{record::UndoRecordAccess, storage::UndoLogStorage};

    #[test]
    fn test_chain_layout() {
        let env = MemEnv::new();
        env.store.create_log(1, UndoPersistence::Permanent);
        env.store.create_log(2, UndoPersistence::Permanent);
        let t1 = TransactionId::new(100);
        let t2 = TransactionId::new(101);

        let a = env.store.append(1, t1, 0, 10);
        let b = env.store.append(1, t1, 0, 10);
        let c = env.store.append(1, t2, 0, 20);
        let d = env.store.append(2, t2, 0, 5);

        assert_eq!(UndoRecPtr::new(1, 10), b);
        assert_eq!(Some(c), env.store.record(a).and_then(|r| r.next));
        assert_eq!(None, env.store.record(b).and_then(|r| r.next));
        assert_eq!(Some(d), env.store.record(c).and_then(|r| r.next));
        assert_eq!(10, env.store.record(c).map(|r| r.prev_len).unwrap_or_default());

        assert_eq!(None, env.store.next_insert_ptr(1, t1));
        assert_eq!(Some(UndoRecPtr::new(1, 40)), env.store.next_insert_ptr(1, t2));
        assert_eq!(Some(UndoRecPtr::new(2, 5)), env.store.next_insert_ptr(2, t2));
        assert_eq!(20, env.store.prev_len(1));
        assert_eq!(Some(a), env.store.first_valid_record(1));
    }

    #[test]
    fn test_discard_and_rewind() {
        let env = MemEnv::new();
        let log = env.store.create_log(1, UndoPersistence::Permanent);
        let t1 = TransactionId::new(100);
        let t2 = TransactionId::new(101);
        env.store.append(1, t1, 0, 10);
        let b = env.store.append(1, t2, 0, 10);
        env.store.append(1, t2, 0, 10);

        env.store.rewind(b, t1);
        assert_eq!(10, log.insert());
        assert_eq!(Some(b), env.store.next_insert_ptr(1, t1));
        assert_eq!(10, env.store.prev_len(1));

        env.store.discard(b, t1).unwrap();
        assert!(env.store.is_discarded(UndoRecPtr::new(1, 0)));
        assert!(!env.store.is_discarded(b));
        assert_eq!(None, env.store.first_valid_record(1));
        assert!(env.store.is_discarded(UndoRecPtr::new(7, 0)));
    }

    #[test]
    fn test_fetch_release_balance() {
        let env = MemEnv::new();
        env.store.create_log(1, UndoPersistence::Permanent);
        let ptr = env.store.append(1, TransactionId::new(100), 0, 10);
        let record = env.store.fetch(ptr).unwrap();
        assert_eq!(1, env.store.outstanding());
        env.store.release(record);
        assert_eq!(0, env.store.outstanding());
        assert!(env.store.fetch(UndoRecPtr::new(1, 500)).is_none());
        assert_eq!(1, env.store.fetches());
    }
}
