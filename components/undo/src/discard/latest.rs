use std::sync::Arc;

use log::trace;
use model::{UndoRecPtr, UnpackedUndoRecord};

use super::UndoDiscarder;
use crate::{error::DiscardError, record::FetchedRecord, registry::UndoLogControl};

/// Undo written by one transaction, as far as it is still reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct TransactionExtent {
    /// Newest undo record of the transaction.
    pub(super) from: UndoRecPtr,

    /// Heads of the chunks the transaction wrote in each log, oldest first.
    pub(super) chunks: Vec<UndoRecPtr>,
}

enum Working<'a, 'r> {
    Start(&'r UnpackedUndoRecord),
    Fetched(FetchedRecord<'a>),
}

impl Working<'_, '_> {
    fn record(&self) -> &UnpackedUndoRecord {
        match self {
            Working::Start(record) => *record,
            Working::Fetched(record) => &**record,
        }
    }
}

impl UndoDiscarder {
    /// Locate the newest undo record of the transaction whose first chunk starts at `start_ptr` in `log`.
    ///
    /// A transaction that ran out of space in one log continues in another, so its chunk heads form a chain across
    /// logs. The chain is followed until the chunk written last:
    ///
    /// - a chunk followed by another transaction's chunk in the same log ends just before that chunk;
    /// - a chunk still at the tail of its log ends just before the log's insert position;
    /// - a chunk whose continuation was already discarded is the last one still reachable.
    pub(super) fn latest_undo_ptr_for_xid(
        &self,
        start_ptr: UndoRecPtr,
        start: &UnpackedUndoRecord,
        log: &Arc<UndoLogControl>,
    ) -> Result<TransactionExtent, DiscardError> {
        let records = &*self.records;
        let mut log = Arc::clone(log);
        let mut ptr = start_ptr;
        let mut working = Working::Start(start);
        let mut chunks = vec![start_ptr];
        let mut refetches = 0;

        loop {
            let (xid, next) = {
                let record = working.record();
                (record.xid, record.next)
            };
            let logno = log.logno();

            match next {
                None => {
                    if let Some(insert) = self.storage.next_insert_ptr(logno, xid) {
                        let from = insert.prev(self.storage.prev_len(logno));
                        return Ok(TransactionExtent { from, chunks });
                    }

                    // A newer transaction took over the log after the header was read, so the link to it must be
                    // visible by now.
                    if refetches >= self.config.discard.refetch_limit {
                        return Err(DiscardError::ChainTailUnstable {
                            logno,
                            xid,
                            attempts: refetches,
                        });
                    }
                    refetches += 1;
                    trace!("Refetch chunk head {ptr} of transaction {xid}, attempt {refetches}");
                    // Release the stale handle before taking a new one on the same chunk head.
                    drop(std::mem::replace(&mut working, Working::Start(start)));
                    working = Working::Fetched(FetchedRecord::fetch(records, ptr)?);
                }

                Some(next) if !next.same_log(ptr) && self.storage.is_discarded(next) => {
                    let insert = self
                        .storage
                        .next_insert_ptr(logno, xid)
                        .ok_or(DiscardError::InsertPointerUnavailable { logno, xid })?;
                    let from = insert.prev(self.storage.prev_len(logno));
                    return Ok(TransactionExtent { from, chunks });
                }

                Some(next) => {
                    let next_record = FetchedRecord::fetch(records, next)?;
                    if next.same_log(ptr) {
                        let from = next.prev(next_record.prev_len);
                        return Ok(TransactionExtent { from, chunks });
                    }

                    log = self
                        .logs
                        .get(next.logno())
                        .ok_or(DiscardError::LogNotFound(next.logno()))?;
                    trace!("Transaction {xid} continues from {ptr} in undo log {}", log.logno());
                    ptr = next;
                    chunks.push(next);
                    working = Working::Fetched(next_record);
                }
            }
        }
    }
}
