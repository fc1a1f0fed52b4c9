//! Read-only view over a built and aggregated hierarchy.

use std::collections::BTreeMap;

use generational_arena::Index;

use crate::domain::arena::{DomainNode, HierarchyTree};
use crate::domain::cpuset::CpuSet;
use crate::domain::entities::{CpuId, Load};

/// Traversal surface handed to renderers. Children are exposed in the order
/// they were first discovered while building.
#[derive(Debug, Clone, Copy)]
pub struct Report<'a> {
    tree: &'a HierarchyTree,
}

/// One node of a [`Report`].
#[derive(Debug, Clone, Copy)]
pub struct NodeView<'a> {
    tree: &'a HierarchyTree,
    idx: Index,
    node: &'a DomainNode,
}

/// Loads of every domain at one level, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelLoads {
    pub level: usize,
    pub type_name: String,
    pub loads: Vec<Load>,
}

impl LevelLoads {
    /// Spread between the busiest and the idlest domain of the level.
    pub fn imbalance(&self) -> Load {
        let max = self.loads.iter().max().copied().unwrap_or(0);
        let min = self.loads.iter().min().copied().unwrap_or(0);
        max - min
    }
}

impl<'a> Report<'a> {
    pub fn new(tree: &'a HierarchyTree) -> Self {
        Self { tree }
    }

    /// Sum of every applied sample.
    pub fn root_load(&self) -> Load {
        self.tree.root_load()
    }

    pub fn top_level(&self) -> impl Iterator<Item = NodeView<'a>> + 'a {
        let tree = self.tree;
        tree.top_level()
            .iter()
            .filter_map(move |&idx| NodeView::new(tree, idx))
    }

    /// Every node in pre-order.
    pub fn walk(&self) -> impl Iterator<Item = NodeView<'a>> + 'a {
        let tree = self.tree;
        tree.iter().map(move |(idx, node)| NodeView { tree, idx, node })
    }

    /// Per-level loads, highest level first.
    pub fn level_summary(&self) -> Vec<LevelLoads> {
        let mut levels: BTreeMap<usize, LevelLoads> = BTreeMap::new();
        for view in self.walk() {
            levels
                .entry(view.level())
                .or_insert_with(|| LevelLoads {
                    level: view.level(),
                    type_name: view.type_name().to_string(),
                    loads: Vec::new(),
                })
                .loads
                .push(view.load());
        }
        levels.into_values().rev().collect()
    }

    /// Load spread among the domains of `level`, None if the level is empty.
    pub fn imbalance(&self, level: usize) -> Option<Load> {
        self.level_summary()
            .into_iter()
            .find(|l| l.level == level)
            .map(|l| l.imbalance())
    }
}

impl<'a> NodeView<'a> {
    fn new(tree: &'a HierarchyTree, idx: Index) -> Option<Self> {
        tree.get_node(idx).map(|node| Self { tree, idx, node })
    }

    /// `cpu<N>` for leaves, the domain type otherwise.
    pub fn name(&self) -> String {
        match self.node.cpu() {
            Some(cpu) => format!("cpu{cpu}"),
            None => self.node.type_name.clone(),
        }
    }

    pub fn type_name(&self) -> &'a str {
        &self.node.type_name
    }

    pub fn level(&self) -> usize {
        self.node.level()
    }

    pub fn members(&self) -> &'a CpuSet {
        self.node.members()
    }

    pub fn member_count(&self) -> usize {
        self.node.members().weight()
    }

    pub fn load(&self) -> Load {
        self.node.load
    }

    pub fn is_leaf_cpu(&self) -> bool {
        self.node.is_leaf_cpu
    }

    pub fn cpu(&self) -> Option<CpuId> {
        self.node.cpu()
    }

    pub fn index(&self) -> Index {
        self.idx
    }

    pub fn children(&self) -> impl Iterator<Item = NodeView<'a>> + 'a {
        let (tree, node) = (self.tree, self.node);
        node.children
            .iter()
            .filter_map(move |&idx| NodeView::new(tree, idx))
    }
}
