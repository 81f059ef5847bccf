mod actor;
mod backend;
mod client;
mod connection;
mod data;
mod history;
mod identifiers;
mod sequencer;
mod timing;
mod wire;

pub use actor::ClientHandle;
pub use backend::spawn_shard;
pub use backend::InMemoryJournal;
pub use backend::Journal;
pub use backend::JournalIndex;
pub use backend::ShardConfig;
pub use backend::ShardCreationError;
pub use backend::ShardError;
pub use backend::ShardHandle;
pub use backend::ShardOptions;
pub use backend::ShardReplica;
pub use backend::StaticResolver;
pub use client::try_create_client;
pub use client::ClientConfig;
pub use client::ClientCreationError;
pub use client::ClientError;
pub use client::ClientLocalHistory;
pub use client::ClientOptions;
pub use client::ClientSnapshot;
pub use client::ClientTransaction;
pub use client::ShardStrategy;
pub use client::SingleShardStrategy;
pub use client::DEFAULT_SHARD_NAME;
pub use connection::Backend;
pub use connection::BackendResolver;
pub use connection::ConnectionError;
pub use connection::RequestError;
pub use connection::ResolutionError;
pub use connection::ShardKey;
pub use connection::TransportError;
pub use data::DataModification;
pub use data::DataPath;
pub use data::DataTree;
pub use data::DelegateError;
pub use data::InMemoryDataTree;
pub use data::NormalizedNode;
pub use history::CloseLocalHistoryPayload;
pub use history::CohortPhase;
pub use history::CommitError;
pub use history::DirectCommit;
pub use history::HistoryError;
pub use history::HistoryState;
pub use history::LocalThreePhaseCommitCohort;
pub use history::LocalTransactionContext;
pub use history::PayloadError;
pub use history::ReadySupport;
pub use history::TransactionError;
pub use history::TransactionState;
pub use identifiers::ClientIdentifier;
pub use identifiers::FormatError;
pub use identifiers::FrontendIdentifier;
pub use identifiers::FrontendType;
pub use identifiers::LocalHistoryIdentifier;
pub use identifiers::MemberName;
pub use identifiers::NameError;
pub use identifiers::TransactionIdentifier;
pub use identifiers::WireFormat;
pub use identifiers::STANDALONE_HISTORY_ID;
pub use sequencer::IngestDecision;
pub use sequencer::ReceiveSequencer;
pub use sequencer::SequenceError;
pub use sequencer::SequenceIssuer;
pub use timing::ConsensusOptions;
pub use timing::ConsensusParams;
pub use wire::ABIVersion;
pub use wire::Envelope;
pub use wire::FailureCause;
pub use wire::Modification;
pub use wire::Payload;
pub use wire::PayloadKind;
pub use wire::PersistenceProtocol;
pub use wire::Target;
pub use wire::DEFAULT_MAX_MESSAGES;

