use crate::data::{DataPath, NormalizedNode};
use crate::identifiers::{ClientIdentifier, FormatError, LocalHistoryIdentifier, TransactionIdentifier};
use std::fmt;

/// Scope a message is addressed to. Sequence numbers are tracked per target.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Target {
    Client(ClientIdentifier),
    History(LocalHistoryIdentifier),
    Transaction(TransactionIdentifier),
}

impl Target {
    pub fn client(&self) -> &ClientIdentifier {
        match self {
            Target::Client(client) => client,
            Target::History(history) => history.client(),
            Target::Transaction(transaction) => transaction.client(),
        }
    }

    pub(crate) fn kind(&self) -> TargetKind {
        match self {
            Target::Client(_) => TargetKind::Client,
            Target::History(_) => TargetKind::History,
            Target::Transaction(_) => TargetKind::Transaction,
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Client(id) => id.fmt(f),
            Target::History(id) => id.fmt(f),
            Target::Transaction(id) => id.fmt(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TargetKind {
    Client,
    History,
    Transaction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modification {
    Write(DataPath, NormalizedNode),
    Merge(DataPath, NormalizedNode),
    Delete(DataPath),
}

/// What the backend should do with the transaction after applying a modification batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceProtocol {
    /// Seal the transaction and hand it to its commit cohort.
    Ready,
    Abort,
}

/// Why a backend refused a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// The backend no longer leads the shard. The client reconnects and replays.
    NotLeader,
    /// Sequence gap. The scope is dead on the backend.
    OutOfOrder { expected: u64, received: u64 },
    ClosedHistory,
    /// A newer generation of the same frontend has connected.
    RetiredGeneration,
    UnknownTransaction,
    /// The transaction's data tree delegate failed.
    Operation(String),
    IllegalState(String),
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::NotLeader => write!(f, "backend is not the shard leader"),
            FailureCause::OutOfOrder { expected, received } => {
                write!(f, "out of order sequence {}, expected {}", received, expected)
            }
            FailureCause::ClosedHistory => write!(f, "local history is closed"),
            FailureCause::RetiredGeneration => write!(f, "client generation has been retired"),
            FailureCause::UnknownTransaction => write!(f, "unknown transaction"),
            FailureCause::Operation(message) => write!(f, "operation failed: {}", message),
            FailureCause::IllegalState(message) => write!(f, "illegal state: {}", message),
        }
    }
}

/// Canonical in-memory form of every message body. Identifier and sequence live on the
/// envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    // Versions are raw so that a newer peer may advertise versions this build doesn't know.
    ConnectClientRequest { min_version: u8, max_version: u8 },
    ConnectClientSuccess {
        backend: String,
        alternates: Vec<String>,
        max_messages: u32,
    },

    ReadTransactionRequest { path: DataPath, snapshot_only: bool },
    ReadTransactionSuccess { data: Option<NormalizedNode> },
    ExistsTransactionRequest { path: DataPath, snapshot_only: bool },
    ExistsTransactionSuccess { exists: bool },
    ModifyTransactionRequest {
        modifications: Vec<Modification>,
        protocol: Option<PersistenceProtocol>,
    },
    ModifyTransactionSuccess,
    TransactionPreCommitRequest,
    TransactionPreCommitSuccess,
    TransactionCommitRequest,
    TransactionCommitSuccess,

    CloseLocalHistoryRequest,
    LocalHistorySuccess,

    RequestFailure { cause: FailureCause },
}

/// Default window of unacknowledged requests a backend accepts, when the wire doesn't say.
pub const DEFAULT_MAX_MESSAGES: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    ConnectClientRequest = 1,
    ConnectClientSuccess = 2,
    ReadTransactionRequest = 3,
    ReadTransactionSuccess = 4,
    ExistsTransactionRequest = 5,
    ExistsTransactionSuccess = 6,
    ModifyTransactionRequest = 7,
    ModifyTransactionSuccess = 8,
    TransactionPreCommitRequest = 9,
    TransactionPreCommitSuccess = 10,
    TransactionCommitRequest = 11,
    TransactionCommitSuccess = 12,
    CloseLocalHistoryRequest = 13,
    LocalHistorySuccess = 14,
    RequestFailure = 15,
}

impl PayloadKind {
    pub(crate) fn from_u8(raw: u8) -> Result<Self, FormatError> {
        let kind = match raw {
            1 => PayloadKind::ConnectClientRequest,
            2 => PayloadKind::ConnectClientSuccess,
            3 => PayloadKind::ReadTransactionRequest,
            4 => PayloadKind::ReadTransactionSuccess,
            5 => PayloadKind::ExistsTransactionRequest,
            6 => PayloadKind::ExistsTransactionSuccess,
            7 => PayloadKind::ModifyTransactionRequest,
            8 => PayloadKind::ModifyTransactionSuccess,
            9 => PayloadKind::TransactionPreCommitRequest,
            10 => PayloadKind::TransactionPreCommitSuccess,
            11 => PayloadKind::TransactionCommitRequest,
            12 => PayloadKind::TransactionCommitSuccess,
            13 => PayloadKind::CloseLocalHistoryRequest,
            14 => PayloadKind::LocalHistorySuccess,
            15 => PayloadKind::RequestFailure,
            other => return Err(FormatError::UnknownKind(other)),
        };

        Ok(kind)
    }

    /// `None` means any target kind is accepted, with an explicit target tag on the wire.
    pub(crate) fn target_kind(self) -> Option<TargetKind> {
        match self {
            PayloadKind::ConnectClientRequest | PayloadKind::ConnectClientSuccess => Some(TargetKind::Client),
            PayloadKind::CloseLocalHistoryRequest | PayloadKind::LocalHistorySuccess => Some(TargetKind::History),
            PayloadKind::RequestFailure => None,
            _ => Some(TargetKind::Transaction),
        }
    }
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::ConnectClientRequest { .. } => PayloadKind::ConnectClientRequest,
            Payload::ConnectClientSuccess { .. } => PayloadKind::ConnectClientSuccess,
            Payload::ReadTransactionRequest { .. } => PayloadKind::ReadTransactionRequest,
            Payload::ReadTransactionSuccess { .. } => PayloadKind::ReadTransactionSuccess,
            Payload::ExistsTransactionRequest { .. } => PayloadKind::ExistsTransactionRequest,
            Payload::ExistsTransactionSuccess { .. } => PayloadKind::ExistsTransactionSuccess,
            Payload::ModifyTransactionRequest { .. } => PayloadKind::ModifyTransactionRequest,
            Payload::ModifyTransactionSuccess => PayloadKind::ModifyTransactionSuccess,
            Payload::TransactionPreCommitRequest => PayloadKind::TransactionPreCommitRequest,
            Payload::TransactionPreCommitSuccess => PayloadKind::TransactionPreCommitSuccess,
            Payload::TransactionCommitRequest => PayloadKind::TransactionCommitRequest,
            Payload::TransactionCommitSuccess => PayloadKind::TransactionCommitSuccess,
            Payload::CloseLocalHistoryRequest => PayloadKind::CloseLocalHistoryRequest,
            Payload::LocalHistorySuccess => PayloadKind::LocalHistorySuccess,
            Payload::RequestFailure { .. } => PayloadKind::RequestFailure,
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Payload::ConnectClientRequest { .. }
                | Payload::ReadTransactionRequest { .. }
                | Payload::ExistsTransactionRequest { .. }
                | Payload::ModifyTransactionRequest { .. }
                | Payload::TransactionPreCommitRequest
                | Payload::TransactionCommitRequest
                | Payload::CloseLocalHistoryRequest
        )
    }
}
