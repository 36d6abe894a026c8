pub mod error;
pub mod undo;
pub mod xid;

pub use crate::undo::UndoLogNumber;
pub use crate::undo::UndoLogOffset;
pub use crate::undo::UndoPersistence;
pub use crate::undo::UndoRecPtr;
pub use crate::undo::UnpackedUndoRecord;
pub use crate::xid::Epoch;
pub use crate::xid::FullTransactionId;
pub use crate::xid::TransactionId;
