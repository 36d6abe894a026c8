use std::ops::Deref;

use log::trace;
#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use model::{UndoRecPtr, UnpackedUndoRecord};

use crate::error::DiscardError;

/// Fetch/release access to decoded undo records, typically backed by a buffer cache.
///
/// Every record handed out by `fetch` must be given back through `release` exactly once.
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait UndoRecordAccess: Send + Sync {
    fn fetch(&self, ptr: UndoRecPtr) -> Option<UnpackedUndoRecord>;

    fn release(&self, record: UnpackedUndoRecord);
}

/// A record fetched through [`UndoRecordAccess`], released when dropped.
pub struct FetchedRecord<'a> {
    access: &'a dyn UndoRecordAccess,
    ptr: UndoRecPtr,
    record: UnpackedUndoRecord,
}

impl<'a> FetchedRecord<'a> {
    /// A missing record means the caller followed a pointer that should never be dangling.
    pub fn fetch(access: &'a dyn UndoRecordAccess, ptr: UndoRecPtr) -> Result<Self, DiscardError> {
        let record = access.fetch(ptr).ok_or(DiscardError::RecordNotFound(ptr))?;
        trace!("Fetched undo record {ptr} of transaction {}", record.xid);
        Ok(Self {
            access,
            ptr,
            record,
        })
    }

    pub fn ptr(&self) -> UndoRecPtr {
        self.ptr
    }
}

impl Deref for FetchedRecord<'_> {
    type Target = UnpackedUndoRecord;

    fn deref(&self) -> &Self::Target {
        &self.record
    }
}

impl Drop for FetchedRecord<'_> {
    fn drop(&mut self) {
        self.access.release(self.record);
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;
    use model::{TransactionId, UndoRecPtr, UnpackedUndoRecord};

    use super::{FetchedRecord, MockUndoRecordAccess};
    use crate::error::DiscardError;

    fn record() -> UnpackedUndoRecord {
        UnpackedUndoRecord {
            xid: TransactionId::new(10),
            xid_epoch: 0,
            next: None,
            prev_len: 0,
        }
    }

    #[test]
    fn test_release_on_drop() -> Result<(), DiscardError> {
        let ptr = UndoRecPtr::new(1, 24);
        let mut access = MockUndoRecordAccess::default();
        access
            .expect_fetch()
            .with(eq(ptr))
            .times(1)
            .returning(|_| Some(record()));
        access
            .expect_release()
            .with(eq(record()))
            .times(1)
            .return_const(());

        let fetched = FetchedRecord::fetch(&access, ptr)?;
        assert_eq!(ptr, fetched.ptr());
        assert_eq!(TransactionId::new(10), fetched.xid);
        drop(fetched);
        Ok(())
    }

    #[test]
    fn test_missing_record() {
        let ptr = UndoRecPtr::new(1, 24);
        let mut access = MockUndoRecordAccess::default();
        access.expect_fetch().times(1).returning(|_| None);
        access.expect_release().never();

        let fetched = FetchedRecord::fetch(&access, ptr);
        match fetched {
            Err(DiscardError::RecordNotFound(missing)) => assert_eq!(ptr, missing),
            _ => panic!("Expected RecordNotFound"),
        }
    }
}
