use crate::data::node::{DataPath, NormalizedNode};
use crate::data::tree::{DataModification, DataTree, DelegateError};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

// Nodes are kept flat, keyed by their full path. Good enough to model a tree for the access layer,
// which only ever forwards opaque operations.
#[derive(Clone, Debug, Default)]
pub struct InMemoryDataTree {
    nodes: Arc<RwLock<BTreeMap<DataPath, NormalizedNode>>>,
}

impl InMemoryDataTree {
    pub fn new() -> Self {
        InMemoryDataTree::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().map(|nodes| nodes.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DataTree for InMemoryDataTree {
    fn new_modification(&self) -> Box<dyn DataModification> {
        let snapshot = self.nodes.read().map(|nodes| nodes.clone()).unwrap_or_default();

        Box::new(InMemoryModification {
            tree: self.nodes.clone(),
            working: snapshot,
            operations: vec![],
        })
    }
}

enum Operation {
    Put(DataPath, NormalizedNode),
    Delete(DataPath),
}

struct InMemoryModification {
    tree: Arc<RwLock<BTreeMap<DataPath, NormalizedNode>>>,
    working: BTreeMap<DataPath, NormalizedNode>,
    operations: Vec<Operation>,
}

fn delete_subtree(nodes: &mut BTreeMap<DataPath, NormalizedNode>, path: &DataPath) {
    nodes.retain(|key, _| !key.starts_with(path));
}

impl DataModification for InMemoryModification {
    fn read(&self, path: &DataPath) -> Result<Option<NormalizedNode>, DelegateError> {
        Ok(self.working.get(path).cloned())
    }

    fn write(&mut self, path: &DataPath, data: NormalizedNode) -> Result<(), DelegateError> {
        // A write replaces the whole subtree.
        delete_subtree(&mut self.working, path);
        self.working.insert(path.clone(), data.clone());
        self.operations.push(Operation::Delete(path.clone()));
        self.operations.push(Operation::Put(path.clone(), data));
        Ok(())
    }

    fn merge(&mut self, path: &DataPath, data: NormalizedNode) -> Result<(), DelegateError> {
        // Opaque leaves merge by replacement; children stay.
        self.working.insert(path.clone(), data.clone());
        self.operations.push(Operation::Put(path.clone(), data));
        Ok(())
    }

    fn delete(&mut self, path: &DataPath) -> Result<(), DelegateError> {
        delete_subtree(&mut self.working, path);
        self.operations.push(Operation::Delete(path.clone()));
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), DelegateError> {
        let mut nodes = self
            .tree
            .write()
            .map_err(|_| DelegateError::Failed(String::from("data tree lock poisoned")))?;

        for operation in self.operations {
            match operation {
                Operation::Put(path, data) => {
                    nodes.insert(path, data);
                }
                Operation::Delete(path) => delete_subtree(&mut nodes, &path),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(segments: &[&str]) -> DataPath {
        DataPath::new(segments.iter().copied()).unwrap()
    }

    fn node(data: &'static str) -> NormalizedNode {
        NormalizedNode::new(data)
    }

    #[test]
    fn empty_tree_has_no_root() {
        let tree = InMemoryDataTree::new();
        let modification = tree.new_modification();

        assert_eq!(modification.read(&DataPath::root()), Ok(None));
        assert_eq!(modification.exists(&DataPath::root()), Ok(false));
    }

    #[test]
    fn modification_is_isolated_until_commit() {
        let tree = InMemoryDataTree::new();
        let mut modification = tree.new_modification();
        modification.write(&path(&["cars"]), node("v1")).unwrap();

        assert_eq!(modification.read(&path(&["cars"])), Ok(Some(node("v1"))));
        assert_eq!(tree.new_modification().read(&path(&["cars"])), Ok(None));

        modification.commit().unwrap();
        assert_eq!(tree.new_modification().read(&path(&["cars"])), Ok(Some(node("v1"))));
    }

    #[test]
    fn write_replaces_subtree_merge_keeps_children() {
        let tree = InMemoryDataTree::new();
        let mut modification = tree.new_modification();
        modification.write(&path(&["cars", "car-1"]), node("red")).unwrap();
        modification.merge(&path(&["cars"]), node("list")).unwrap();
        assert_eq!(modification.read(&path(&["cars", "car-1"])), Ok(Some(node("red"))));

        modification.write(&path(&["cars"]), node("list-2")).unwrap();
        assert_eq!(modification.read(&path(&["cars", "car-1"])), Ok(None));
        modification.commit().unwrap();

        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn delete_removes_descendants() {
        let tree = InMemoryDataTree::new();
        let mut modification = tree.new_modification();
        modification.write(&path(&["a", "b"]), node("x")).unwrap();
        modification.write(&path(&["a", "c"]), node("y")).unwrap();
        modification.write(&path(&["d"]), node("z")).unwrap();
        modification.delete(&path(&["a"])).unwrap();
        modification.commit().unwrap();

        assert_eq!(tree.len(), 1);
    }
}
