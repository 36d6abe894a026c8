use std::fmt::{self, Display, Formatter};

#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use model::UndoRecPtr;

use crate::error::ReplayError;

/// Undo records of one transaction, replayed newest first: from `from` back to `to`, both inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UndoRange {
    /// Newest undo record of the transaction, possibly in a later log than `to`.
    pub from: UndoRecPtr,

    /// First undo record of the transaction in the log being discarded.
    pub to: UndoRecPtr,
}

impl Display for UndoRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.to, self.from)
    }
}

/// Owner of the resources (buffer pins, locks) acquired on behalf of the current execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceOwner {
    /// Long-lived owner of a background worker, used outside of any transaction.
    Auxiliary,

    /// Owner scoped to the transaction currently in progress.
    Transaction,
}

/// Execution state threaded explicitly through the replay engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    resource_owner: Option<ResourceOwner>,
    in_transaction: bool,
}

impl ExecutionContext {
    /// Context of a background worker outside of any transaction.
    pub fn auxiliary() -> Self {
        Self {
            resource_owner: Some(ResourceOwner::Auxiliary),
            in_transaction: false,
        }
    }

    pub fn resource_owner(&self) -> Option<ResourceOwner> {
        self.resource_owner
    }

    pub fn set_resource_owner(&mut self, owner: Option<ResourceOwner>) {
        self.resource_owner = owner;
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub fn set_in_transaction(&mut self, in_transaction: bool) {
        self.in_transaction = in_transaction;
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::auxiliary()
    }
}

/// Rollback engine re-applying pre-images of an aborted transaction.
///
/// Undo actions run inside a transaction of their own: `start_transaction`, then `execute_undo_actions`, then
/// `commit_transaction`, or `abort_transaction` if execution failed. Ending the transaction may reset the resource
/// owner of `context`.
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait RollbackReplay: Send + Sync {
    fn start_transaction(&self, context: &mut ExecutionContext);

    fn execute_undo_actions(
        &self,
        context: &mut ExecutionContext,
        range: UndoRange,
    ) -> Result<(), ReplayError>;

    fn commit_transaction(&self, context: &mut ExecutionContext);

    fn abort_transaction(&self, context: &mut ExecutionContext);
}
