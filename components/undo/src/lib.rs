//! # Design Overview
//!
//! `undo` crate reclaims space of append-only undo logs. Every transaction writes its pre-images into one or more
//! undo logs; the chunk of a transaction inside a log is headed by a record whose `next` pointer links to the
//! chunk written after it. A discard pass walks these chunks from each log's discard pointer, oldest first, and
//! moves the pointer past every transaction that is older than the oldest snapshot still running.
//!
//! Transactions that aborted without getting their rollback executed, typically because the process crashed, are
//! found by the same walk: they are older than `xmin` yet not committed. Their undo actions are replayed before the
//! discard pointer moves past them, which makes the discard pointer the recovery checkpoint of pending rollbacks.
//!
//! After all logs are processed, the oldest transaction still having undo is published to
//! [`OldestXidHavingUndo`], which readers consult to decide whether undo of a transaction may still exist.
//!
//! # Collaborators
//! Storage, record decoding, commit status and the rollback engine live elsewhere; this crate sees them through
//! [`UndoLogStorage`], [`UndoRecordAccess`], [`TransactionStatus`] and [`RollbackReplay`].
//!
//! # Concurrency
//! Only one discard pass runs at a time, which [`UndoDiscarder::discard`] enforces by taking `&mut self`. Readers
//! share [`UndoLogs`] and [`OldestXidHavingUndo`] and only ever wait for the short exclusive section that assigns the
//! new discard boundary of a log.

pub mod error;
pub mod metrics;
pub mod record;
pub mod registry;
pub mod replay;
pub mod storage;
pub mod watermark;
pub mod xact;

mod discard;

#[cfg(any(test, feature = "mock"))]
pub mod mem;

pub use crate::discard::UndoDiscarder;
pub use crate::error::{DiscardError, ReplayError};
pub use crate::registry::{DiscardInfo, UndoLogControl, UndoLogs};
pub use crate::record::{FetchedRecord, UndoRecordAccess};
pub use crate::replay::{ExecutionContext, ResourceOwner, RollbackReplay, UndoRange};
pub use crate::storage::UndoLogStorage;
pub use crate::watermark::OldestXidHavingUndo;
pub use crate::xact::TransactionStatus;
