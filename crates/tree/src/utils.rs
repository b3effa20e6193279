//! Whole-tree queries.

use crate::iterator::{IterationOrder, TreeIterator};
use crate::node::NodeRef;

/// Number of nodes in the tree rooted at `root`, holes excluded.
pub fn count_nodes(root: &NodeRef) -> usize {
    TreeIterator::new(Some(root))
        .order(IterationOrder::PreOrderedDepthFirst)
        .count()
}

/// Number of levels below `root` (0 for a lone node).
pub fn tree_depth(root: &NodeRef) -> usize {
    let base = root.route().len();
    TreeIterator::new(Some(root))
        .order(IterationOrder::PreOrderedDepthFirst)
        .map(|visit| visit.route.len() - base)
        .max()
        .unwrap_or(0)
}

/// True if no node in the tree is frozen.
pub fn is_tree_mutable(root: &NodeRef) -> bool {
    TreeIterator::new(Some(root))
        .order(IterationOrder::PreOrderedDepthFirst)
        .all(|visit| visit.node.is_some_and(|node| !node.is_immutable()))
}

/// True if any node reachable from `root`, `root` included, is destroyed.
pub fn any_destroyed(root: &NodeRef) -> bool {
    TreeIterator::new(Some(root))
        .order(IterationOrder::PreOrderedDepthFirst)
        .any(|visit| visit.node.is_some_and(|node| node.is_destroyed()))
}
