mod in_memory;
mod node;
mod tree;

pub use in_memory::InMemoryDataTree;
pub use node::DataPath;
pub use node::NormalizedNode;
pub use tree::DataModification;
pub use tree::DataTree;
pub use tree::DelegateError;
