//! Arena-backed scheduling-domain hierarchy.

use generational_arena::{Arena, Index};
use tracing::instrument;

use crate::domain::cpuset::CpuSet;
use crate::domain::entities::{CpuId, DomainKey, Load, LEAF_TYPE};

/// A scheduling scope, or a terminal CPU when `is_leaf_cpu` is set.
#[derive(Debug, Clone)]
pub struct DomainNode {
    pub key: DomainKey,
    /// Kernel-reported domain class, e.g. `SMT` or `MC`.
    pub type_name: String,
    /// Accumulated load of every member CPU.
    pub load: Load,
    pub is_leaf_cpu: bool,
    /// Index of the parent node, None for top-level nodes.
    pub parent: Option<Index>,
    /// Child indices in discovery order.
    pub children: Vec<Index>,
}

impl DomainNode {
    pub fn domain(key: DomainKey, type_name: impl Into<String>) -> Self {
        Self {
            key,
            type_name: type_name.into(),
            load: 0,
            is_leaf_cpu: false,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn cpu_leaf(cpu: CpuId) -> Self {
        Self {
            key: DomainKey::leaf(cpu),
            type_name: LEAF_TYPE.to_string(),
            load: 0,
            is_leaf_cpu: true,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn level(&self) -> usize {
        self.key.level
    }

    pub fn members(&self) -> &CpuSet {
        &self.key.members
    }

    /// The CPU of a leaf node.
    pub fn cpu(&self) -> Option<CpuId> {
        if self.is_leaf_cpu {
            self.key.members.iter().next()
        } else {
            None
        }
    }
}

/// Hierarchy of scheduling domains under a virtual root.
///
/// Every node is owned by exactly one parent (the virtual root for top-level
/// domains). The virtual root is not stored in the arena; it only holds the
/// ordered list of top-level indices and the total load.
#[derive(Debug)]
pub struct HierarchyTree {
    arena: Arena<DomainNode>,
    top_level: Vec<Index>,
    root_load: Load,
}

impl Default for HierarchyTree {
    fn default() -> Self {
        Self::new()
    }
}

impl HierarchyTree {
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            top_level: Vec::new(),
            root_load: 0,
        }
    }

    /// Append `node` as the last child of `parent` (the virtual root if None).
    #[instrument(level = "trace", skip(self, node), fields(key = %node.key))]
    pub fn insert_node(&mut self, node: DomainNode, parent: Option<Index>) -> Index {
        let node = DomainNode { parent, ..node };
        let node_idx = self.arena.insert(node);

        match parent {
            Some(parent_idx) => {
                if let Some(parent) = self.arena.get_mut(parent_idx) {
                    parent.children.push(node_idx);
                }
            }
            None => self.top_level.push(node_idx),
        }

        node_idx
    }

    pub fn get_node(&self, idx: Index) -> Option<&DomainNode> {
        self.arena.get(idx)
    }

    pub fn get_node_mut(&mut self, idx: Index) -> Option<&mut DomainNode> {
        self.arena.get_mut(idx)
    }

    /// Children of `parent`, or the top-level nodes if None.
    pub fn children_of(&self, parent: Option<Index>) -> &[Index] {
        match parent {
            Some(idx) => self
                .arena
                .get(idx)
                .map(|node| node.children.as_slice())
                .unwrap_or(&[]),
            None => &self.top_level,
        }
    }

    pub fn top_level(&self) -> &[Index] {
        &self.top_level
    }

    /// Total load attributed through the virtual root.
    pub fn root_load(&self) -> Load {
        self.root_load
    }

    pub(crate) fn set_root_load(&mut self, load: Load) {
        self.root_load = load;
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Pre-order traversal, children in discovery order.
    pub fn iter(&self) -> TreeIterator<'_> {
        TreeIterator::new(self)
    }

    /// Find the node with `key` by scanning the tree.
    pub fn find(&self, key: &DomainKey) -> Option<Index> {
        self.iter()
            .find(|(_, node)| &node.key == key)
            .map(|(idx, _)| idx)
    }

    /// Number of node levels below the virtual root.
    #[instrument(level = "debug", skip(self))]
    pub fn depth(&self) -> usize {
        self.top_level
            .iter()
            .map(|&idx| self.calculate_depth(idx))
            .max()
            .unwrap_or(0)
    }

    fn calculate_depth(&self, node_idx: Index) -> usize {
        if let Some(node) = self.get_node(node_idx) {
            1 + node
                .children
                .iter()
                .map(|&child| self.calculate_depth(child))
                .max()
                .unwrap_or(0)
        } else {
            0
        }
    }

    /// CPUs of all leaf nodes, in traversal order.
    pub fn leaf_cpus(&self) -> Vec<CpuId> {
        self.iter().filter_map(|(_, node)| node.cpu()).collect()
    }
}

pub struct TreeIterator<'a> {
    tree: &'a HierarchyTree,
    stack: Vec<Index>,
}

impl<'a> TreeIterator<'a> {
    fn new(tree: &'a HierarchyTree) -> Self {
        let stack = tree.top_level.iter().rev().copied().collect();
        Self { tree, stack }
    }
}

impl<'a> Iterator for TreeIterator<'a> {
    type Item = (Index, &'a DomainNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current_idx) = self.stack.pop() {
            if let Some(node) = self.tree.get_node(current_idx) {
                // Push children in reverse order for left-to-right traversal
                for &child in node.children.iter().rev() {
                    self.stack.push(child);
                }
                return Some((current_idx, node));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> HierarchyTree {
        // MC{0-3}
        // ├── SMT{0,1}
        // │   ├── cpu0
        // │   └── cpu1
        // └── SMT{2,3}
        let mut tree = HierarchyTree::new();
        let mc = tree.insert_node(
            DomainNode::domain(DomainKey::new(2, CpuSet::from_cpus(0..4)), "MC"),
            None,
        );
        let smt0 = tree.insert_node(
            DomainNode::domain(DomainKey::new(1, CpuSet::from_cpus([0, 1])), "SMT"),
            Some(mc),
        );
        tree.insert_node(DomainNode::cpu_leaf(0), Some(smt0));
        tree.insert_node(DomainNode::cpu_leaf(1), Some(smt0));
        tree.insert_node(
            DomainNode::domain(DomainKey::new(1, CpuSet::from_cpus([2, 3])), "SMT"),
            Some(mc),
        );
        tree
    }

    #[test]
    fn given_tree_when_iterating_then_preorder_follows_insertion() {
        let tree = sample_tree();
        let keys: Vec<String> = tree.iter().map(|(_, n)| n.key.to_string()).collect();
        assert_eq!(keys, vec!["L2[0-3]", "L1[0-1]", "L0[0]", "L0[1]", "L1[2-3]"]);
    }

    #[test]
    fn given_tree_when_querying_then_depth_leaves_and_parents_match() {
        let tree = sample_tree();
        assert_eq!(tree.depth(), 3);
        assert_eq!(tree.len(), 5);
        assert_eq!(tree.leaf_cpus(), vec![0, 1]);

        let leaf = tree.find(&DomainKey::leaf(1)).unwrap();
        let parent = tree.get_node(leaf).unwrap().parent.unwrap();
        assert_eq!(tree.get_node(parent).unwrap().type_name, "SMT");
        assert_eq!(tree.children_of(None).len(), 1);
    }

    #[test]
    fn given_empty_tree_when_querying_then_everything_is_empty() {
        let tree = HierarchyTree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.iter().count(), 0);
        assert_eq!(tree.root_load(), 0);
    }
}
