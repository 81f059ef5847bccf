use crate::connection::{Backend, BackendResolver, ResolutionError};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Resolves shards from a table maintained by hand. Point a shard at a new primary with
/// `set_primary()`, e.g. after moving leadership.
#[derive(Clone, Default)]
pub struct StaticResolver {
    primaries: Arc<RwLock<BTreeMap<String, Arc<dyn Backend>>>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_primary(&self, shard_name: &str, backend: Arc<dyn Backend>) {
        if let Ok(mut primaries) = self.primaries.write() {
            primaries.insert(shard_name.to_string(), backend);
        }
    }

    pub fn remove_primary(&self, shard_name: &str) {
        if let Ok(mut primaries) = self.primaries.write() {
            primaries.remove(shard_name);
        }
    }
}

#[async_trait::async_trait]
impl BackendResolver for StaticResolver {
    async fn find_primary(&self, shard_name: &str) -> Result<Arc<dyn Backend>, ResolutionError> {
        self.primaries
            .read()
            .ok()
            .and_then(|primaries| primaries.get(shard_name).cloned())
            .ok_or_else(|| ResolutionError::NoPrimary(shard_name.to_string()))
    }
}
