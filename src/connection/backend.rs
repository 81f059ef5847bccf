use crate::data::DataTree;
use crate::identifiers::FormatError;
use crate::wire::FailureCause;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

/// Cookie identifying a shard within a client.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShardKey(pub u64);

impl fmt::Debug for ShardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shard-{}", self.0)
    }
}

/// The current leader of a shard, as seen over the wire. A request frame goes in, the matching
/// response frame comes out.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// Identity of this backend incarnation.
    fn name(&self) -> &str;

    async fn deliver(&self, frame: Bytes) -> Result<Bytes, TransportError>;

    /// Data tree of a co-located backend. Enables the local fast path for transactions.
    fn local_data_tree(&self) -> Option<Arc<dyn DataTree>> {
        None
    }
}

/// Shard discovery, e.g. a lookup of the primary replica.
#[async_trait::async_trait]
pub trait BackendResolver: Send + Sync {
    async fn find_primary(&self, shard_name: &str) -> Result<Arc<dyn Backend>, ResolutionError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Backend {0} is unreachable")]
    Unreachable(String),
    #[error("Backend {0} dropped the request")]
    Dropped(String),
}

/// Every variant can be retried by resolving again.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    #[error("No primary known for shard {0}")]
    NoPrimary(String),
    #[error("Timed out resolving shard {0}")]
    Timeout(String),
    #[error("Backend refused the connection: {0}")]
    Refused(FailureCause),
    #[error("Backend speaks no ABI version we support")]
    IncompatibleVersion,
    #[error("Malformed handshake response: {0}")]
    Format(#[from] FormatError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    // Permanent.
    #[error("Connection is already closed")]
    AlreadyClosed,
}
