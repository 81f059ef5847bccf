mod journal;
mod replica;
mod resolver;
mod shard;

pub use journal::InMemoryJournal;
pub use journal::Journal;
pub use journal::JournalIndex;
pub use replica::spawn_shard;
pub use replica::ShardConfig;
pub use replica::ShardError;
pub use replica::ShardHandle;
pub use replica::ShardReplica;
pub use resolver::StaticResolver;
pub use shard::ShardCreationError;
pub use shard::ShardOptions;
