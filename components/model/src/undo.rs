use std::fmt::{self, Display, Formatter};

use crate::error::UndoRecPtrError;
use crate::xid::{Epoch, TransactionId};

pub type UndoLogNumber = u32;

pub type UndoLogOffset = u64;

/// Number of low bits of an [`UndoRecPtr`] holding the byte offset within its log.
pub const UNDO_LOG_OFFSET_BITS: u32 = 40;

pub const UNDO_LOG_MAX_OFFSET: UndoLogOffset = (1 << UNDO_LOG_OFFSET_BITS) - 1;

pub const UNDO_LOG_MAX_NUMBER: UndoLogNumber = (1 << (64 - UNDO_LOG_OFFSET_BITS)) - 1;

/// Position of an undo record: log number in the high 24 bits, byte offset in the low 40 bits.
///
/// Pointers of the same log are ordered by offset. Comparing pointers of different logs yields an order,
/// but it carries no meaning beyond grouping by log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UndoRecPtr(u64);

impl UndoRecPtr {
    pub fn new(logno: UndoLogNumber, offset: UndoLogOffset) -> Self {
        debug_assert!(logno <= UNDO_LOG_MAX_NUMBER, "Undo log number overflow");
        debug_assert!(offset <= UNDO_LOG_MAX_OFFSET, "Undo log offset overflow");
        Self(((logno as u64) << UNDO_LOG_OFFSET_BITS) | (offset & UNDO_LOG_MAX_OFFSET))
    }

    pub fn try_new(logno: UndoLogNumber, offset: UndoLogOffset) -> Result<Self, UndoRecPtrError> {
        if logno > UNDO_LOG_MAX_NUMBER {
            return Err(UndoRecPtrError::LogNumberOverflow(logno));
        }
        if offset > UNDO_LOG_MAX_OFFSET {
            return Err(UndoRecPtrError::OffsetOverflow(offset));
        }
        Ok(Self::new(logno, offset))
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn logno(self) -> UndoLogNumber {
        (self.0 >> UNDO_LOG_OFFSET_BITS) as UndoLogNumber
    }

    pub const fn offset(self) -> UndoLogOffset {
        self.0 & UNDO_LOG_MAX_OFFSET
    }

    pub fn same_log(self, other: Self) -> bool {
        self.logno() == other.logno()
    }

    /// Pointer to the record that ends where this one starts, given that record's length.
    pub fn prev(self, len: u16) -> Self {
        debug_assert!(self.offset() >= len as UndoLogOffset, "Stepped before log start");
        Self::new(self.logno(), self.offset().saturating_sub(len as UndoLogOffset))
    }
}

impl Display for UndoRecPtr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:06X}.{:010X}", self.logno(), self.offset())
    }
}

/// How an undo log survives crashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UndoPersistence {
    Permanent,
    Unlogged,
    /// Undo of temporary tables, private to one session and never replayed.
    Temporary,
}

/// Decoded header fields of an undo record. Payload is not interpreted here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnpackedUndoRecord {
    pub xid: TransactionId,

    pub xid_epoch: Epoch,

    /// Start of the next transaction chunk written after the chunk this record heads, possibly in
    /// another log when the transaction overflowed. `None` while the chunk is the newest one.
    pub next: Option<UndoRecPtr>,

    /// Length of the record physically preceding this one in the same log.
    pub prev_len: u16,
}
