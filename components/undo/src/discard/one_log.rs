use std::sync::Arc;

use log::{info, trace};
use model::TransactionId;

use super::{Boundary, UndoDiscarder};
use crate::{error::DiscardError, record::FetchedRecord, registry::UndoLogControl, replay::UndoRange};

impl UndoDiscarder {
    /// Walk `log` from its discard pointer and move the pointer past every transaction older than `xmin`, replaying
    /// undo of the aborted ones on the way.
    ///
    /// Returns the oldest transaction still owning undo in the log, [`TransactionId::INVALID`] when no transaction
    /// owns the new boundary or there was nothing to do.
    pub(super) fn discard_one_log(
        &mut self,
        log: &Arc<UndoLogControl>,
        xmin: TransactionId,
        hibernate: &mut bool,
    ) -> Result<TransactionId, DiscardError> {
        let logno = log.logno();
        let info = log.discard_info();
        let Some(mut undo_recptr) = info.oldest_data else {
            return Ok(TransactionId::INVALID);
        };
        let mut xid = info.oldest_xid;
        let mut latest_discard_xid = None;
        let records = Arc::clone(&self.records);

        let boundary = loop {
            if self.storage.next_insert_ptr(logno, xid) == Some(undo_recptr) {
                if log.oldest_data() == Some(undo_recptr) {
                    trace!("Undo log {logno} has nothing to discard at {undo_recptr}");
                    return Ok(TransactionId::INVALID);
                }
                // Undo of a rolled back transaction was rewound, leaving only the pointer to move.
                break Boundary::Drained(undo_recptr);
            }

            let record = FetchedRecord::fetch(&*records, undo_recptr)?;
            xid = record.xid;
            let epoch = record.xid_epoch;
            let next = record.next;

            if xid.precedes(xmin) && !self.replayed.contains(&undo_recptr) && !self.xact.did_commit(xid) {
                let extent = match self.latest_undo_ptr_for_xid(undo_recptr, &record, log) {
                    Ok(extent) => extent,
                    Err(e) if e.is_transient() => {
                        info!("{e}, undo log {logno} stays at {undo_recptr} for this pass");
                        break Boundary::Retain {
                            ptr: undo_recptr,
                            xid,
                            epoch,
                        };
                    }
                    Err(e) => return Err(e),
                };
                drop(record);

                let range = UndoRange {
                    from: extent.from,
                    to: undo_recptr,
                };
                self.execute_undo_actions(xid, range)?;
                self.replayed.extend(extent.chunks);
                *hibernate = false;
            } else {
                drop(record);
            }

            if !xid.precedes(xmin) {
                break Boundary::Retain {
                    ptr: undo_recptr,
                    xid,
                    epoch,
                };
            }

            match next {
                Some(next) if next.same_log(undo_recptr) => {
                    latest_discard_xid = Some(xid);
                    undo_recptr = next;
                }
                _ => match self.storage.next_insert_ptr(logno, xid) {
                    // Last writer of this log, so everything it wrote here can go.
                    Some(insert) => {
                        latest_discard_xid = Some(xid);
                        break Boundary::Drained(insert);
                    }
                    None => {
                        info!(
                            "Undo log {logno} got a new writer after transaction {xid}, it stays at {undo_recptr} \
                             for this pass"
                        );
                        break Boundary::Retain {
                            ptr: undo_recptr,
                            xid,
                            epoch,
                        };
                    }
                },
            }
        };

        self.commit_boundary(log, boundary, latest_discard_xid, hibernate)
    }
}
