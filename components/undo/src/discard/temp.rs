use log::debug;
use model::{TransactionId, UndoLogNumber, UndoPersistence};

use super::UndoDiscarder;
use crate::{error::DiscardError, metrics::UNDO_TEMP_DISCARD_COUNT};

impl UndoDiscarder {
    /// Discard all undo of a temporary log, typically when its owning session ends.
    ///
    /// Undo of temporary tables is private to one session and dies with it, so nothing is replayed.
    pub fn discard_temp(&self, logno: UndoLogNumber) -> Result<(), DiscardError> {
        let log = self
            .logs
            .get(logno)
            .ok_or(DiscardError::LogNotFound(logno))?;
        if log.persistence() != UndoPersistence::Temporary {
            return Err(DiscardError::NotTemporary(logno));
        }

        let insert = log.insert_ptr();
        self.storage.discard(insert, TransactionId::INVALID)?;
        UNDO_TEMP_DISCARD_COUNT.inc();
        debug!("Discarded temporary undo log {logno} up to {insert}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use model::{TransactionId, UndoPersistence, UndoRecPtr};

    use crate::{error::DiscardError, mem::MemEnv, storage::UndoLogStorage};

    #[test]
    fn test_discard_temp() -> Result<(), Box<dyn Error>> {
        let env = MemEnv::new();
        env.store.create_log(9, UndoPersistence::Temporary);
        env.store.append(9, TransactionId::new(100), 0, 10);
        env.store.append(9, TransactionId::new(100), 0, 10);

        let mut discarder = env.discarder(config::Configuration::default());

        // Regular passes leave temporary logs alone, aborted or not.
        assert!(discarder.discard(TransactionId::new(200))?);
        assert!(env.store.discards().is_empty());

        discarder.discard_temp(9)?;
        assert_eq!(
            vec![(UndoRecPtr::new(9, 20), TransactionId::INVALID)],
            env.store.discards()
        );
        assert!(env.replay.calls().is_empty());
        assert_eq!(None, env.store.first_valid_record(9));
        Ok(())
    }

    #[test]
    fn test_discard_temp_rejected() {
        let env = MemEnv::new();
        env.store.create_log(1, UndoPersistence::Permanent);
        env.store.create_log(2, UndoPersistence::Unlogged);
        let discarder = env.discarder(config::Configuration::default());

        assert!(matches!(discarder.discard_temp(1), Err(DiscardError::NotTemporary(1))));
        assert!(matches!(discarder.discard_temp(2), Err(DiscardError::NotTemporary(2))));
        assert!(matches!(discarder.discard_temp(3), Err(DiscardError::LogNotFound(3))));
        assert!(env.store.discards().is_empty());
    }
}
