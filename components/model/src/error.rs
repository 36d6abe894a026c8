use thiserror::Error;

use crate::undo::{UndoLogNumber, UndoLogOffset};

#[derive(Debug, Error, PartialEq)]
pub enum UndoRecPtrError {
    #[error("Undo log number `{0}` does not fit into 24 bits")]
    LogNumberOverflow(UndoLogNumber),

    #[error("Undo log offset `{0}` does not fit into 40 bits")]
    OffsetOverflow(UndoLogOffset),
}
