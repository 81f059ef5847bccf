use crate::data::node::{DataPath, NormalizedNode};
use std::fmt::Debug;

/// Failure raised by the data tree while applying an operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DelegateError {
    #[error("Invalid path {0}")]
    InvalidPath(String),
    #[error("Data tree operation failed: {0}")]
    Failed(String),
}

/// The tree-structured data model, consumed as an opaque collaborator.
pub trait DataTree: Send + Sync + Debug {
    fn new_modification(&self) -> Box<dyn DataModification>;
}

/// A private working copy of the tree. Reads observe the modification's own writes.
pub trait DataModification: Send {
    fn read(&self, path: &DataPath) -> Result<Option<NormalizedNode>, DelegateError>;

    fn exists(&self, path: &DataPath) -> Result<bool, DelegateError> {
        self.read(path).map(|node| node.is_some())
    }

    fn write(&mut self, path: &DataPath, data: NormalizedNode) -> Result<(), DelegateError>;

    fn merge(&mut self, path: &DataPath, data: NormalizedNode) -> Result<(), DelegateError>;

    fn delete(&mut self, path: &DataPath) -> Result<(), DelegateError>;

    /// Apply the modification to the tree it was created from.
    fn commit(self: Box<Self>) -> Result<(), DelegateError>;
}
