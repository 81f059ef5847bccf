use crate::connection::ShardKey;
use crate::data::DataPath;

/// Maps data to shards. Placement policy is up to the deployment.
pub trait ShardStrategy: Send + Sync {
    fn shard_for_path(&self, path: &DataPath) -> ShardKey;

    /// Name the resolver knows the shard by. `None` if the shard doesn't exist.
    fn shard_name(&self, shard: ShardKey) -> Option<String>;
}

/// Everything, root included, lives in shard 0, named `default`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleShardStrategy;

pub const DEFAULT_SHARD_NAME: &str = "default";

impl ShardStrategy for SingleShardStrategy {
    fn shard_for_path(&self, _path: &DataPath) -> ShardKey {
        ShardKey(0)
    }

    fn shard_name(&self, shard: ShardKey) -> Option<String> {
        if shard == ShardKey(0) {
            Some(String::from(DEFAULT_SHARD_NAME))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_resolves_to_shard_zero() {
        assert_eq!(SingleShardStrategy.shard_for_path(&DataPath::root()), ShardKey(0));
        assert_eq!(
            SingleShardStrategy.shard_for_path(&DataPath::new(vec!["cars", "car-1"]).unwrap()),
            ShardKey(0)
        );
        assert_eq!(SingleShardStrategy.shard_name(ShardKey(0)).as_deref(), Some("default"));
        assert_eq!(SingleShardStrategy.shard_name(ShardKey(1)), None);
    }
}
