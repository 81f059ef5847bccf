use crate::history::transaction::TransactionState;
use crate::identifiers::{LocalHistoryIdentifier, TransactionIdentifier};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryState {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("Local history {0:?} is closed")]
    Closed(LocalHistoryIdentifier),
    #[error("Local history {0:?} still has open transaction {1:?}")]
    OpenTransaction(LocalHistoryIdentifier, TransactionIdentifier),
    #[error("Transaction {0:?} does not belong to this history")]
    UnknownTransaction(TransactionIdentifier),
}

/// Bookkeeping for one local history: allocates transaction IDs in order and tracks each
/// transaction until it finishes.
#[derive(Debug)]
pub struct LocalHistory {
    identifier: LocalHistoryIdentifier,
    state: HistoryState,
    next_transaction_id: u64,
    transactions: BTreeMap<TransactionIdentifier, TransactionState>,
}

impl LocalHistory {
    pub fn new(identifier: LocalHistoryIdentifier) -> Self {
        LocalHistory {
            identifier,
            state: HistoryState::Open,
            next_transaction_id: 0,
            transactions: BTreeMap::new(),
        }
    }

    pub fn identifier(&self) -> &LocalHistoryIdentifier {
        &self.identifier
    }

    pub fn state(&self) -> HistoryState {
        self.state
    }

    pub fn create_transaction(&mut self) -> Result<TransactionIdentifier, HistoryError> {
        if self.state == HistoryState::Closed {
            return Err(HistoryError::Closed(self.identifier.clone()));
        }

        let identifier = TransactionIdentifier::new(self.identifier.clone(), self.next_transaction_id);
        self.next_transaction_id += 1;
        self.transactions.insert(identifier.clone(), TransactionState::Open);

        Ok(identifier)
    }

    pub fn transaction_state(&self, identifier: &TransactionIdentifier) -> Option<TransactionState> {
        self.transactions.get(identifier).copied()
    }

    /// Finished transactions are forgotten.
    pub fn update_transaction(
        &mut self,
        identifier: &TransactionIdentifier,
        state: TransactionState,
    ) -> Result<(), HistoryError> {
        if !self.transactions.contains_key(identifier) {
            return Err(HistoryError::UnknownTransaction(identifier.clone()));
        }

        if state.is_finished() {
            self.transactions.remove(identifier);
        } else {
            self.transactions.insert(identifier.clone(), state);
        }

        Ok(())
    }

    /// Closing twice is fine. Closing with a transaction still open is not.
    pub fn close(&mut self) -> Result<(), HistoryError> {
        if let Some((open, _)) = self
            .transactions
            .iter()
            .find(|(_, state)| **state == TransactionState::Open)
        {
            return Err(HistoryError::OpenTransaction(self.identifier.clone(), open.clone()));
        }

        self.state = HistoryState::Closed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::{ClientIdentifier, FrontendIdentifier, FrontendType, MemberName};

    fn history() -> LocalHistory {
        let frontend = FrontendIdentifier::new(MemberName::new("member").unwrap(), FrontendType::new("type").unwrap());
        LocalHistory::new(LocalHistoryIdentifier::new(ClientIdentifier::new(frontend, 0), 1))
    }

    #[test]
    fn transactions_are_numbered_in_order() {
        let mut history = history();
        let first = history.create_transaction().unwrap();
        let second = history.create_transaction().unwrap();

        assert_eq!(first.transaction_id(), 0);
        assert_eq!(second.transaction_id(), 1);
        assert_eq!(first.history(), history.identifier());
    }

    #[test]
    fn close_requires_no_open_transaction() {
        let mut history = history();
        let tx = history.create_transaction().unwrap();

        assert_eq!(
            history.close(),
            Err(HistoryError::OpenTransaction(history.identifier().clone(), tx.clone()))
        );

        history.update_transaction(&tx, TransactionState::Ready).unwrap();
        history.close().unwrap();
        assert_eq!(history.state(), HistoryState::Closed);
    }

    #[test]
    fn closed_history_rejects_transactions() {
        let mut history = history();
        history.close().unwrap();

        assert_eq!(
            history.create_transaction(),
            Err(HistoryError::Closed(history.identifier().clone()))
        );
    }

    #[test]
    fn finished_transactions_are_dropped() {
        let mut history = history();
        let tx = history.create_transaction().unwrap();
        history.update_transaction(&tx, TransactionState::Committed).unwrap();

        assert_eq!(history.transaction_state(&tx), None);
        assert!(history.update_transaction(&tx, TransactionState::Aborted).is_err());
    }
}
