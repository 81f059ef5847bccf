mod behavior;
mod context;
mod errors;
mod handles;
mod options;
mod shard;
mod wiring;

pub use errors::ClientError;
pub use handles::ClientLocalHistory;
pub use handles::ClientSnapshot;
pub use handles::ClientTransaction;
pub use options::ClientOptions;
pub use shard::ShardStrategy;
pub use shard::SingleShardStrategy;
pub use shard::DEFAULT_SHARD_NAME;
pub use wiring::try_create_client;
pub use wiring::ClientConfig;
pub use wiring::ClientCreationError;

pub(crate) use behavior::ClientBehavior;
pub(crate) use context::ClientContext;
