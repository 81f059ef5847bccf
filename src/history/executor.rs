use crate::data::DataTree;
use crate::history::cohort::{CommitError, DirectCommit, LocalThreePhaseCommitCohort};
use crate::history::transaction::{LocalTransactionContext, TransactionError};
use crate::identifiers::{LocalHistoryIdentifier, TransactionIdentifier};
use crate::wire::{FailureCause, Modification, Payload, PersistenceProtocol};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Applies transaction requests to a data tree and answers with the response payload. Shared by
/// the shard backend and the client's local fast path, so both behave the same.
pub struct TransactionExecutor {
    logger: slog::Logger,
    tree: Arc<dyn DataTree>,
    open: BTreeMap<TransactionIdentifier, LocalTransactionContext<DirectCommit>>,
    readied: BTreeMap<TransactionIdentifier, LocalThreePhaseCommitCohort>,
}

impl TransactionExecutor {
    pub fn new(logger: slog::Logger, tree: Arc<dyn DataTree>) -> Self {
        TransactionExecutor {
            logger,
            tree,
            open: BTreeMap::new(),
            readied: BTreeMap::new(),
        }
    }

    pub fn tree(&self) -> &Arc<dyn DataTree> {
        &self.tree
    }

    /// Whether `payload` is something this executor handles.
    pub fn handles(payload: &Payload) -> bool {
        matches!(
            payload,
            Payload::ReadTransactionRequest { .. }
                | Payload::ExistsTransactionRequest { .. }
                | Payload::ModifyTransactionRequest { .. }
                | Payload::TransactionPreCommitRequest
                | Payload::TransactionCommitRequest
        )
    }

    pub fn execute(&mut self, transaction: &TransactionIdentifier, payload: &Payload) -> Payload {
        let result = match payload {
            Payload::ReadTransactionRequest { path, .. } => self
                .context(transaction)
                .and_then(|context| context.execute_read(path).map_err(failure_from_transaction))
                .map(|data| Payload::ReadTransactionSuccess { data }),
            Payload::ExistsTransactionRequest { path, .. } => self
                .context(transaction)
                .and_then(|context| context.execute_exists(path).map_err(failure_from_transaction))
                .map(|exists| Payload::ExistsTransactionSuccess { exists }),
            Payload::ModifyTransactionRequest { modifications, protocol } => {
                self.modify(transaction, modifications, *protocol)
            }
            Payload::TransactionPreCommitRequest => self.cohort(transaction).and_then(|cohort| {
                cohort
                    .pre_commit()
                    .map(|_| Payload::TransactionPreCommitSuccess)
                    .map_err(failure_from_commit)
            }),
            Payload::TransactionCommitRequest => self.commit(transaction),
            other => Err(FailureCause::IllegalState(format!("{:?} is not a transaction request", other.kind()))),
        };

        result.unwrap_or_else(|cause| {
            slog::debug!(self.logger, "{:?} failed: {}", transaction, cause);
            Payload::RequestFailure { cause }
        })
    }

    /// Whether `transaction` is open or readied here.
    pub fn is_active(&self, transaction: &TransactionIdentifier) -> bool {
        self.open.contains_key(transaction) || self.readied.contains_key(transaction)
    }

    /// Drop every unfinished transaction of `history`.
    pub fn abort_history(&mut self, history: &LocalHistoryIdentifier) {
        self.open.retain(|id, _| id.history() != history);
        self.readied.retain(|id, _| id.history() != history);
    }

    pub fn retain<F: Fn(&TransactionIdentifier) -> bool>(&mut self, keep: F) {
        self.open.retain(|id, _| keep(id));
        self.readied.retain(|id, _| keep(id));
    }

    fn modify(
        &mut self,
        transaction: &TransactionIdentifier,
        modifications: &[Modification],
        protocol: Option<PersistenceProtocol>,
    ) -> Result<Payload, FailureCause> {
        if protocol == Some(PersistenceProtocol::Abort) {
            if let Some(mut cohort) = self.readied.remove(transaction) {
                cohort.abort().map_err(failure_from_commit)?;
                slog::debug!(self.logger, "Aborted readied {:?}", transaction);
                return Ok(Payload::ModifyTransactionSuccess);
            }
        }

        let context = self.context(transaction)?;
        for modification in modifications {
            let result = match modification {
                Modification::Write(path, data) => context.execute_write(path, data.clone()),
                Modification::Merge(path, data) => context.execute_merge(path, data.clone()),
                Modification::Delete(path) => context.execute_delete(path),
            };
            result.map_err(failure_from_transaction)?;
        }

        match protocol {
            None => Ok(Payload::ModifyTransactionSuccess),
            Some(PersistenceProtocol::Abort) => {
                context.abort();
                self.open.remove(transaction);
                Ok(Payload::ModifyTransactionSuccess)
            }
            Some(PersistenceProtocol::Ready) => {
                let mut cohort = context.ready().map_err(failure_from_transaction)?;
                self.open.remove(transaction);
                cohort.initiate_coordinated_commit().map_err(failure_from_commit)?;
                self.readied.insert(transaction.clone(), cohort);
                Ok(Payload::ModifyTransactionSuccess)
            }
        }
    }

    fn commit(&mut self, transaction: &TransactionIdentifier) -> Result<Payload, FailureCause> {
        let result = self.cohort(transaction)?.commit();
        self.readied.remove(transaction);
        result.map_err(failure_from_commit)?;

        slog::debug!(self.logger, "Committed {:?}", transaction);
        Ok(Payload::TransactionCommitSuccess)
    }

    fn context(
        &mut self,
        transaction: &TransactionIdentifier,
    ) -> Result<&mut LocalTransactionContext<DirectCommit>, FailureCause> {
        if self.readied.contains_key(transaction) {
            return Err(FailureCause::IllegalState(format!("{:?} is already ready", transaction)));
        }

        let logger = &self.logger;
        let tree = &self.tree;
        Ok(self.open.entry(transaction.clone()).or_insert_with(|| {
            LocalTransactionContext::new(logger.clone(), transaction.clone(), tree.new_modification(), DirectCommit)
        }))
    }

    fn cohort(&mut self, transaction: &TransactionIdentifier) -> Result<&mut LocalThreePhaseCommitCohort, FailureCause> {
        self.readied
            .get_mut(transaction)
            .ok_or(FailureCause::UnknownTransaction)
    }
}

fn failure_from_transaction(error: TransactionError) -> FailureCause {
    match error {
        TransactionError::NotOpen(..) => FailureCause::IllegalState(error.to_string()),
        TransactionError::Delegate(e) => FailureCause::Operation(e.to_string()),
    }
}

fn failure_from_commit(error: CommitError) -> FailureCause {
    match error {
        CommitError::Operation(e) | CommitError::Commit(e) => FailureCause::Operation(e.to_string()),
        CommitError::IllegalPhase { .. } => FailureCause::IllegalState(error.to_string()),
    }
}
