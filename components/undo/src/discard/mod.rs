//! Discard pass over all undo logs.
//!
//! A pass visits logs in ascending log number. For each non-temporary log whose oldest transaction precedes
//! `xmin`, the chunks from the discard pointer on are walked oldest first:
//!
//! - committed transactions older than `xmin` are skipped;
//! - aborted transactions older than `xmin` get their undo actions replayed, then are skipped;
//! - the first transaction not older than `xmin`, or the end of the log, becomes the new discard boundary.
//!
//! The boundary is assigned under the log's exclusive discard lock; physical truncation happens after the lock is
//! released.

use std::sync::Arc;

use log::{debug, error, trace};
use minstant::Instant;
use model::{FullTransactionId, TransactionId, UndoPersistence, UndoRecPtr};
use rustc_hash::FxHashSet;

use crate::{
    error::DiscardError,
    metrics::{
        UNDO_DISCARD_ADVANCE_COUNT, UNDO_DISCARD_BYTES_COUNT, UNDO_DISCARD_LATENCY_HISTOGRAM,
        UNDO_DISCARD_PASS_COUNT, UNDO_FAILED_DISCARD_PASS_COUNT, UNDO_FAILED_REPLAY_COUNT,
        UNDO_OLDEST_XID_HAVING_UNDO, UNDO_REPLAY_COUNT,
    },
    record::UndoRecordAccess,
    registry::{DiscardInfo, UndoLogControl, UndoLogs},
    replay::{ExecutionContext, RollbackReplay, UndoRange},
    storage::UndoLogStorage,
    watermark::OldestXidHavingUndo,
    xact::TransactionStatus,
};

mod latest;
mod one_log;
mod temp;

/// Where a walk over one log stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    /// Undo of `xid` starting at `ptr` is retained.
    Retain {
        ptr: UndoRecPtr,
        xid: TransactionId,
        epoch: model::Epoch,
    },

    /// Nothing before `ptr` is needed and no transaction owns `ptr` yet.
    Drained(UndoRecPtr),
}

impl Boundary {
    fn discard_info(self) -> DiscardInfo {
        match self {
            Boundary::Retain { ptr, xid, epoch } => DiscardInfo {
                oldest_xid: xid,
                oldest_xid_epoch: epoch,
                oldest_data: Some(ptr),
            },
            Boundary::Drained(ptr) => DiscardInfo {
                oldest_xid: TransactionId::INVALID,
                oldest_xid_epoch: 0,
                oldest_data: Some(ptr),
            },
        }
    }
}

/// Discard worker of the undo subsystem.
///
/// Only one pass may run at a time, so all passes go through `&mut self`. Log metadata and the watermark are shared
/// with readers through [`UndoLogs`] and [`OldestXidHavingUndo`].
pub struct UndoDiscarder {
    config: Arc<config::Configuration>,
    logs: Arc<UndoLogs>,
    storage: Arc<dyn UndoLogStorage>,
    records: Arc<dyn UndoRecordAccess>,
    replay: Arc<dyn RollbackReplay>,
    xact: Arc<dyn TransactionStatus>,
    watermark: Arc<OldestXidHavingUndo>,

    /// Execution state of the worker, outside of any transaction between replays.
    context: ExecutionContext,

    /// Chunk heads whose transaction has been rolled back while still above the discard pointer of their log.
    /// A transaction spanning several logs is rolled back as a whole from its first chunk, so the later chunks
    /// must not be replayed again when their own log is walked.
    replayed: FxHashSet<UndoRecPtr>,
}

impl UndoDiscarder {
    pub fn new(
        config: Arc<config::Configuration>,
        logs: Arc<UndoLogs>,
        storage: Arc<dyn UndoLogStorage>,
        records: Arc<dyn UndoRecordAccess>,
        replay: Arc<dyn RollbackReplay>,
        xact: Arc<dyn TransactionStatus>,
        watermark: Arc<OldestXidHavingUndo>,
    ) -> Self {
        Self {
            config,
            logs,
            storage,
            records,
            replay,
            xact,
            watermark,
            context: ExecutionContext::auxiliary(),
            replayed: FxHashSet::default(),
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn logs(&self) -> &Arc<UndoLogs> {
        &self.logs
    }

    pub fn watermark(&self) -> &Arc<OldestXidHavingUndo> {
        &self.watermark
    }

    /// Run one discard pass with `oldest_xmin`, the oldest transaction any running snapshot may still see.
    ///
    /// Returns whether the caller may hibernate: `true` if no log advanced and no rollback was replayed. On error,
    /// logs processed before the failing one keep their new boundaries but the watermark is not published.
    pub fn discard(&mut self, oldest_xmin: TransactionId) -> Result<bool, DiscardError> {
        let start = Instant::now();
        let result = self.discard_logs(oldest_xmin);
        UNDO_DISCARD_LATENCY_HISTOGRAM.observe(start.elapsed().as_micros() as f64);
        match &result {
            Ok(hibernate) => {
                UNDO_DISCARD_PASS_COUNT.inc();
                trace!("Discard pass with xmin {oldest_xmin} completed, hibernate={hibernate}");
            }
            Err(e) => {
                UNDO_FAILED_DISCARD_PASS_COUNT.inc();
                error!("Discard pass with xmin {oldest_xmin} failed: {e}");
            }
        }
        result
    }

    fn discard_logs(&mut self, oldest_xmin: TransactionId) -> Result<bool, DiscardError> {
        let mut hibernate = true;
        let mut oldest_xid_having_undo = oldest_xmin;
        let mut epoch = self.xact.epoch_for_xid(oldest_xmin);

        for log in self.logs.snapshot() {
            if log.persistence() == UndoPersistence::Temporary {
                continue;
            }

            let mut oldest_xid = TransactionId::INVALID;
            let info = log.discard_info();
            if info.oldest_xid.precedes(oldest_xmin) {
                if !info.oldest_xid.is_valid() {
                    match self.storage.first_valid_record(log.logno()) {
                        Some(first) => log.bootstrap(first),
                        None => {
                            trace!("Undo log {} holds no records", log.logno());
                            continue;
                        }
                    }
                }
                oldest_xid = self.discard_one_log(&log, oldest_xmin, &mut hibernate)?;
            }

            if oldest_xid.is_valid() && oldest_xid.precedes(oldest_xid_having_undo) {
                oldest_xid_having_undo = oldest_xid;
                epoch = self.xact.epoch_for_xid(oldest_xid);
            }
        }

        self.forget_retired_marks();

        let published = self
            .watermark
            .publish(FullTransactionId::new(epoch, oldest_xid_having_undo));
        UNDO_OLDEST_XID_HAVING_UNDO.set(published.raw() as i64);
        debug!("Oldest xid having undo is {published}");
        Ok(hibernate)
    }

    /// Drop replay marks of logs that are no longer registered, their boundary will never pass them.
    fn forget_retired_marks(&mut self) {
        let logs = &self.logs;
        self.replayed.retain(|ptr| logs.get(ptr.logno()).is_some());
    }

    /// Replay undo actions of an aborted transaction in a transaction of its own.
    ///
    /// The resource owner in effect before the call is restored whatever the outcome.
    fn execute_undo_actions(
        &mut self,
        xid: TransactionId,
        range: UndoRange,
    ) -> Result<(), DiscardError> {
        let owner = self.context.resource_owner();
        debug!("Replay undo of aborted transaction {xid} over {range}");

        self.replay.start_transaction(&mut self.context);
        let result = self.replay.execute_undo_actions(&mut self.context, range);
        match &result {
            Ok(()) => self.replay.commit_transaction(&mut self.context),
            Err(_) => self.replay.abort_transaction(&mut self.context),
        }
        self.context.set_resource_owner(owner);

        match result {
            Ok(()) => {
                UNDO_REPLAY_COUNT.inc();
                Ok(())
            }
            Err(source) => {
                UNDO_FAILED_REPLAY_COUNT.inc();
                error!("Failed to replay undo of transaction {xid} over {range}: {source}");
                Err(DiscardError::Replay { xid, range, source })
            }
        }
    }

    /// Assign the new boundary of `log`, then physically discard what lies before it if anything was passed.
    ///
    /// `discard_xid` is the newest transaction walked past, `None` if the walk did not advance.
    fn commit_boundary(
        &mut self,
        log: &UndoLogControl,
        boundary: Boundary,
        discard_xid: Option<TransactionId>,
        hibernate: &mut bool,
    ) -> Result<TransactionId, DiscardError> {
        let next = boundary.discard_info();
        let prev = log.update_discard_info(next);

        let (Some(xid), Some(ptr)) = (discard_xid, next.oldest_data) else {
            return Ok(next.oldest_xid);
        };
        debug_assert!(prev.oldest_data.map_or(true, |prev| prev <= ptr));

        *hibernate = false;
        self.storage.discard(ptr, xid)?;
        self.replayed
            .retain(|replayed| !replayed.same_log(ptr) || *replayed >= ptr);

        UNDO_DISCARD_ADVANCE_COUNT.inc();
        if let Some(prev) = prev.oldest_data {
            UNDO_DISCARD_BYTES_COUNT.inc_by(ptr.offset().saturating_sub(prev.offset()));
        }
        debug!(
            "Discarded undo log {} up to {ptr}, newest discarded transaction {xid}, oldest retained {}",
            log.logno(),
            next.oldest_xid
        );
        Ok(next.oldest_xid)
    }
}
