use crate::data::{DataModification, DelegateError};
use crate::identifiers::TransactionIdentifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CohortPhase {
    Ready,
    CanCommit,
    PreCommitted,
    Committed,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommitError {
    // A write/merge/delete failed before the transaction was readied.
    #[error("Transaction operation failed: {0}")]
    Operation(DelegateError),
    #[error("Commit failed: {0}")]
    Commit(DelegateError),
    #[error("Cannot {operation} a cohort in phase {phase:?}")]
    IllegalPhase { operation: &'static str, phase: CohortPhase },
}

/// Receives readied local transactions.
pub trait ReadySupport {
    fn on_transaction_ready(
        &mut self,
        identifier: &TransactionIdentifier,
        delegate: Box<dyn DataModification>,
        operation_error: Option<DelegateError>,
    ) -> LocalThreePhaseCommitCohort;
}

/// Readies straight into a cohort that commits to the delegate's own tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectCommit;

impl ReadySupport for DirectCommit {
    fn on_transaction_ready(
        &mut self,
        identifier: &TransactionIdentifier,
        delegate: Box<dyn DataModification>,
        operation_error: Option<DelegateError>,
    ) -> LocalThreePhaseCommitCohort {
        LocalThreePhaseCommitCohort::new(identifier.clone(), delegate, operation_error)
    }
}

/// Drives one readied transaction through can-commit, pre-commit and commit.
pub struct LocalThreePhaseCommitCohort {
    identifier: TransactionIdentifier,
    delegate: Option<Box<dyn DataModification>>,
    operation_error: Option<DelegateError>,
    phase: CohortPhase,
}

impl LocalThreePhaseCommitCohort {
    pub fn new(
        identifier: TransactionIdentifier,
        delegate: Box<dyn DataModification>,
        operation_error: Option<DelegateError>,
    ) -> Self {
        LocalThreePhaseCommitCohort {
            identifier,
            delegate: Some(delegate),
            operation_error,
            phase: CohortPhase::Ready,
        }
    }

    pub fn identifier(&self) -> &TransactionIdentifier {
        &self.identifier
    }

    pub fn phase(&self) -> CohortPhase {
        self.phase
    }

    pub fn operation_error(&self) -> Option<&DelegateError> {
        self.operation_error.as_ref()
    }

    /// Surfaces the error captured before ready, if any, instead of proceeding. The cohort is
    /// aborted in that case.
    pub fn initiate_coordinated_commit(&mut self) -> Result<(), CommitError> {
        self.expect_phase("initiate commit of", CohortPhase::Ready)?;

        if let Some(e) = self.operation_error.clone() {
            self.delegate = None;
            self.phase = CohortPhase::Aborted;
            return Err(CommitError::Operation(e));
        }

        self.phase = CohortPhase::CanCommit;
        Ok(())
    }

    pub fn pre_commit(&mut self) -> Result<(), CommitError> {
        self.expect_phase("pre-commit", CohortPhase::CanCommit)?;
        self.phase = CohortPhase::PreCommitted;
        Ok(())
    }

    pub fn commit(&mut self) -> Result<(), CommitError> {
        self.expect_phase("commit", CohortPhase::PreCommitted)?;
        let delegate = self.delegate.take().ok_or(CommitError::IllegalPhase {
            operation: "commit",
            phase: self.phase,
        })?;

        match delegate.commit() {
            Ok(()) => {
                self.phase = CohortPhase::Committed;
                Ok(())
            }
            Err(e) => {
                self.phase = CohortPhase::Aborted;
                Err(CommitError::Commit(e))
            }
        }
    }

    pub fn abort(&mut self) -> Result<(), CommitError> {
        if self.phase == CohortPhase::Committed {
            return Err(CommitError::IllegalPhase {
                operation: "abort",
                phase: self.phase,
            });
        }

        self.delegate = None;
        self.phase = CohortPhase::Aborted;
        Ok(())
    }

    fn expect_phase(&self, operation: &'static str, expected: CohortPhase) -> Result<(), CommitError> {
        if self.phase != expected {
            return Err(CommitError::IllegalPhase {
                operation,
                phase: self.phase,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataPath, DataTree, InMemoryDataTree, NormalizedNode};
    use crate::identifiers::{ClientIdentifier, FrontendIdentifier, FrontendType, LocalHistoryIdentifier, MemberName};

    fn tx_id() -> TransactionIdentifier {
        let frontend = FrontendIdentifier::new(MemberName::new("member").unwrap(), FrontendType::new("type").unwrap());
        TransactionIdentifier::new(LocalHistoryIdentifier::new(ClientIdentifier::new(frontend, 0), 1), 1)
    }

    #[test]
    fn three_phases_apply_to_tree() {
        let tree = InMemoryDataTree::new();
        let mut modification = tree.new_modification();
        modification.write(&DataPath::root(), NormalizedNode::new("v")).unwrap();

        let mut cohort = DirectCommit.on_transaction_ready(&tx_id(), modification, None);
        cohort.initiate_coordinated_commit().unwrap();
        assert!(tree.is_empty());
        cohort.pre_commit().unwrap();
        cohort.commit().unwrap();

        assert_eq!(cohort.phase(), CohortPhase::Committed);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn phases_must_be_in_order() {
        let tree = InMemoryDataTree::new();
        let mut cohort = LocalThreePhaseCommitCohort::new(tx_id(), tree.new_modification(), None);

        assert_eq!(
            cohort.commit(),
            Err(CommitError::IllegalPhase {
                operation: "commit",
                phase: CohortPhase::Ready
            })
        );
        cohort.initiate_coordinated_commit().unwrap();
        assert!(cohort.initiate_coordinated_commit().is_err());
    }

    #[test]
    fn captured_error_aborts() {
        let tree = InMemoryDataTree::new();
        let error = DelegateError::Failed(String::from("mock"));
        let mut cohort = LocalThreePhaseCommitCohort::new(tx_id(), tree.new_modification(), Some(error.clone()));

        assert_eq!(cohort.initiate_coordinated_commit(), Err(CommitError::Operation(error)));
        assert_eq!(cohort.phase(), CohortPhase::Aborted);
        assert!(cohort.pre_commit().is_err());
    }

    #[test]
    fn cannot_abort_committed() {
        let tree = InMemoryDataTree::new();
        let mut cohort = LocalThreePhaseCommitCohort::new(tx_id(), tree.new_modification(), None);
        cohort.initiate_coordinated_commit().unwrap();
        cohort.pre_commit().unwrap();
        cohort.commit().unwrap();

        assert!(cohort.abort().is_err());
    }
}
