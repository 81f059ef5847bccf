use crate::data::{DataModification, DataPath, DelegateError, NormalizedNode};
use crate::history::cohort::{LocalThreePhaseCommitCohort, ReadySupport};
use crate::identifiers::TransactionIdentifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Open,
    Ready,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_finished(self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::Aborted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    #[error("Transaction {0:?} is {1:?}, operation requires it to be open")]
    NotOpen(TransactionIdentifier, TransactionState),
    #[error(transparent)]
    Delegate(#[from] DelegateError),
}

/// A transaction whose data is resident locally. Mutations go straight to the delegate, but a
/// delegate failure is not reported by the mutation itself. The first failure is kept and handed
/// to the commit cohort at `ready()`, later mutations still run.
pub struct LocalTransactionContext<R: ReadySupport> {
    logger: slog::Logger,
    identifier: TransactionIdentifier,
    delegate: Option<Box<dyn DataModification>>,
    ready_support: R,
    operation_error: Option<DelegateError>,
    state: TransactionState,
}

impl<R: ReadySupport> LocalTransactionContext<R> {
    pub fn new(
        logger: slog::Logger,
        identifier: TransactionIdentifier,
        delegate: Box<dyn DataModification>,
        ready_support: R,
    ) -> Self {
        let logger = logger.new(slog::o!("Transaction" => format!("{:?}", identifier)));
        LocalTransactionContext {
            logger,
            identifier,
            delegate: Some(delegate),
            ready_support,
            operation_error: None,
            state: TransactionState::Open,
        }
    }

    pub fn identifier(&self) -> &TransactionIdentifier {
        &self.identifier
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn execute_write(&mut self, path: &DataPath, data: NormalizedNode) -> Result<(), TransactionError> {
        let result = self.open_delegate()?.write(path, data);
        self.capture("write", result);
        Ok(())
    }

    pub fn execute_merge(&mut self, path: &DataPath, data: NormalizedNode) -> Result<(), TransactionError> {
        let result = self.open_delegate()?.merge(path, data);
        self.capture("merge", result);
        Ok(())
    }

    pub fn execute_delete(&mut self, path: &DataPath) -> Result<(), TransactionError> {
        let result = self.open_delegate()?.delete(path);
        self.capture("delete", result);
        Ok(())
    }

    // Reads report delegate failures directly, there is nothing to defer them to.
    pub fn execute_read(&mut self, path: &DataPath) -> Result<Option<NormalizedNode>, TransactionError> {
        Ok(self.open_delegate()?.read(path)?)
    }

    pub fn execute_exists(&mut self, path: &DataPath) -> Result<bool, TransactionError> {
        Ok(self.open_delegate()?.exists(path)?)
    }

    /// Seal the transaction and hand the delegate, along with the first captured failure, to the
    /// commit cohort.
    pub fn ready(&mut self) -> Result<LocalThreePhaseCommitCohort, TransactionError> {
        let delegate = match (self.state, self.delegate.take()) {
            (TransactionState::Open, Some(delegate)) => delegate,
            (state, delegate) => {
                self.delegate = delegate;
                return Err(TransactionError::NotOpen(self.identifier.clone(), state));
            }
        };

        self.state = TransactionState::Ready;
        let operation_error = self.operation_error.take();
        slog::debug!(self.logger, "Ready, captured error: {:?}", operation_error);

        Ok(self
            .ready_support
            .on_transaction_ready(&self.identifier, delegate, operation_error))
    }

    pub fn abort(&mut self) {
        if self.state == TransactionState::Open {
            self.delegate = None;
            self.state = TransactionState::Aborted;
        }
    }

    fn open_delegate(&mut self) -> Result<&mut Box<dyn DataModification>, TransactionError> {
        match (self.state, self.delegate.as_mut()) {
            (TransactionState::Open, Some(delegate)) => Ok(delegate),
            (state, _) => Err(TransactionError::NotOpen(self.identifier.clone(), state)),
        }
    }

    fn capture(&mut self, operation: &'static str, result: Result<(), DelegateError>) {
        if let Err(e) = result {
            slog::warn!(self.logger, "Deferring {} failure until ready: {}", operation, e);
            if self.operation_error.is_none() {
                self.operation_error = Some(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::cohort::{CommitError, DirectCommit};
    use crate::identifiers::{ClientIdentifier, FrontendIdentifier, FrontendType, LocalHistoryIdentifier, MemberName};
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct Calls(Arc<Mutex<Vec<&'static str>>>);

    impl Calls {
        fn push(&self, call: &'static str) {
            self.0.lock().unwrap().push(call);
        }

        fn take(&self) -> Vec<&'static str> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    // Fails every operation named in `failing`, recording every call.
    struct ScriptedDelegate {
        calls: Calls,
        failing: Vec<&'static str>,
    }

    impl ScriptedDelegate {
        fn op(&self, name: &'static str) -> Result<(), DelegateError> {
            self.calls.push(name);
            if self.failing.contains(&name) {
                Err(DelegateError::Failed(format!("mock {}", name)))
            } else {
                Ok(())
            }
        }
    }

    impl DataModification for ScriptedDelegate {
        fn read(&self, _: &DataPath) -> Result<Option<NormalizedNode>, DelegateError> {
            self.op("read").map(|_| Some(NormalizedNode::new("node")))
        }

        fn write(&mut self, _: &DataPath, _: NormalizedNode) -> Result<(), DelegateError> {
            self.op("write")
        }

        fn merge(&mut self, _: &DataPath, _: NormalizedNode) -> Result<(), DelegateError> {
            self.op("merge")
        }

        fn delete(&mut self, _: &DataPath) -> Result<(), DelegateError> {
            self.op("delete")
        }

        fn commit(self: Box<Self>) -> Result<(), DelegateError> {
            self.op("commit")
        }
    }

    fn context(failing: Vec<&'static str>) -> (LocalTransactionContext<DirectCommit>, Calls) {
        let calls = Calls::default();
        let delegate = ScriptedDelegate {
            calls: calls.clone(),
            failing,
        };
        let frontend = FrontendIdentifier::new(MemberName::new("member").unwrap(), FrontendType::new("type").unwrap());
        let id = TransactionIdentifier::new(LocalHistoryIdentifier::new(ClientIdentifier::new(frontend, 0), 0), 0);
        let logger = slog::Logger::root(slog::Discard, slog::o!());

        (
            LocalTransactionContext::new(logger, id, Box::new(delegate), DirectCommit),
            calls,
        )
    }

    fn node() -> NormalizedNode {
        NormalizedNode::new("node")
    }

    #[test]
    fn operations_reach_delegate() {
        let (mut context, calls) = context(vec![]);
        let root = DataPath::root();

        context.execute_write(&root, node()).unwrap();
        context.execute_merge(&root, node()).unwrap();
        context.execute_delete(&root).unwrap();
        assert_eq!(context.execute_read(&root), Ok(Some(node())));
        assert_eq!(context.execute_exists(&root), Ok(true));

        assert_eq!(calls.take(), vec!["write", "merge", "delete", "read", "read"]);
    }

    #[test]
    fn ready_without_error_commits() {
        let (mut context, calls) = context(vec![]);
        let mut cohort = context.ready().unwrap();

        assert_eq!(context.state(), TransactionState::Ready);
        cohort.initiate_coordinated_commit().unwrap();
        cohort.pre_commit().unwrap();
        cohort.commit().unwrap();
        assert_eq!(calls.take(), vec!["commit"]);
    }

    #[test]
    fn first_write_error_surfaces_at_ready() {
        let (mut context, calls) = context(vec!["write", "delete"]);
        let root = DataPath::root();

        context.execute_write(&root, node()).unwrap();
        context.execute_merge(&root, node()).unwrap();
        context.execute_delete(&root).unwrap();
        assert_eq!(calls.take(), vec!["write", "merge", "delete"]);

        let mut cohort = context.ready().unwrap();
        assert_eq!(
            cohort.initiate_coordinated_commit(),
            Err(CommitError::Operation(DelegateError::Failed(String::from("mock write"))))
        );
        assert!(calls.take().is_empty());
    }

    #[test]
    fn repeated_merge_error_keeps_first() {
        let (mut context, calls) = context(vec!["merge"]);
        let root = DataPath::root();

        context.execute_merge(&root, node()).unwrap();
        context.execute_merge(&root, node()).unwrap();
        assert_eq!(calls.take(), vec!["merge", "merge"]);

        let mut cohort = context.ready().unwrap();
        assert!(matches!(
            cohort.initiate_coordinated_commit(),
            Err(CommitError::Operation(_))
        ));
    }

    #[test]
    fn read_error_is_immediate() {
        let (mut context, _) = context(vec!["read"]);
        assert!(matches!(
            context.execute_read(&DataPath::root()),
            Err(TransactionError::Delegate(_))
        ));
    }

    #[test]
    fn no_operations_after_ready() {
        let (mut context, _) = context(vec![]);
        context.ready().unwrap();

        assert!(matches!(
            context.execute_write(&DataPath::root(), node()),
            Err(TransactionError::NotOpen(_, TransactionState::Ready))
        ));
        assert!(context.ready().is_err());
    }

    #[test]
    fn abort() {
        let (mut context, _) = context(vec![]);
        context.abort();

        assert_eq!(context.state(), TransactionState::Aborted);
        assert!(context.execute_delete(&DataPath::root()).is_err());
    }
}
