//! Conversion of a [`Report`] into a printable `termtree`.

use termtree::Tree;
use tracing::instrument;

use crate::domain::{encode, NodeView, Report};

/// Label options for rendered nodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Append the kernel-format cpumask of every domain, at this width
    pub mask_width: Option<usize>,
}

pub trait TreeNodeConvert {
    fn to_tree_string(&self, opts: RenderOptions) -> Tree<String>;
}

impl TreeNodeConvert for NodeView<'_> {
    fn to_tree_string(&self, opts: RenderOptions) -> Tree<String> {
        let leaves: Vec<_> = self.children().map(|c| c.to_tree_string(opts)).collect();
        Tree::new(label(self, opts)).with_leaves(leaves)
    }
}

impl TreeNodeConvert for Report<'_> {
    #[instrument(level = "debug", skip_all)]
    fn to_tree_string(&self, opts: RenderOptions) -> Tree<String> {
        let leaves: Vec<_> = self.top_level().map(|n| n.to_tree_string(opts)).collect();
        if leaves.is_empty() {
            return Tree::new("Empty tree".to_string());
        }
        Tree::new(format!("total load={}", self.root_load())).with_leaves(leaves)
    }
}

fn label(node: &NodeView<'_>, opts: RenderOptions) -> String {
    if node.is_leaf_cpu() {
        return format!("{} load={}", node.name(), node.load());
    }
    let mut label = format!(
        "{} L{} [{}] load={}",
        node.name(),
        node.level(),
        node.members(),
        node.load()
    );
    if let Some(width) = opts.mask_width {
        label.push_str(&format!(" mask={}", encode(node.members(), width)));
    }
    label
}
