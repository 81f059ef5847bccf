mod cohort;
mod executor;
mod local_history;
mod payload;
mod transaction;

pub use cohort::CommitError;
pub use cohort::CohortPhase;
pub use cohort::DirectCommit;
pub use cohort::LocalThreePhaseCommitCohort;
pub use cohort::ReadySupport;
pub use executor::TransactionExecutor;
pub use local_history::HistoryError;
pub use local_history::HistoryState;
pub use local_history::LocalHistory;
pub use payload::CloseLocalHistoryPayload;
pub use payload::PayloadError;
pub use transaction::LocalTransactionContext;
pub use transaction::TransactionError;
pub use transaction::TransactionState;
