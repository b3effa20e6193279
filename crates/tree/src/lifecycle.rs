//! Reservation counting and destruction.
//!
//! Counting is intrusive: the count lives on the node, and [`NodeRef`]
//! handles never touch it. A node starts at [`IMPLICIT_RESERVATION`], which
//! stands for exactly one owner (the slot or version that holds it). Every
//! extra owner calls [`NodeRef::reserve`]; every owner that lets go calls
//! [`NodeRef::release`]. Releasing the last owner moves the count to
//! [`DESTROYED`] and cascades the release to every child.
//!
//! Destruction is deterministic and synchronous: the caller that drops the
//! last owner pays for the cascade on its own thread.
//!
//! [`ReservedNode`] wraps the explicit calls in an RAII guard for callers that
//! prefer scoped ownership.

use crate::error::{Result, TreeError};
use crate::node::{NodeKind, NodeRef};
use std::ops::Deref;
use std::sync::atomic::Ordering;
use tracing::{trace, warn};

/// Count of a node with exactly one, unreserved, owner.
pub const IMPLICIT_RESERVATION: i64 = 0;

/// Count of a destroyed node.
pub const DESTROYED: i64 = -1;

impl NodeRef {
    /// Current reservation count (`-1` once destroyed).
    pub fn reservation_count(&self) -> i64 {
        self.0.reservations.load(Ordering::Acquire)
    }

    pub fn is_destroyed(&self) -> bool {
        self.reservation_count() == DESTROYED
    }

    /// Register one more owner. Returns the new count.
    pub fn reserve(&self) -> Result<i64> {
        let counter = &self.0.reservations;
        let mut current = counter.load(Ordering::Acquire);
        loop {
            if current == DESTROYED {
                return Err(TreeError::Destroyed {
                    op: "reserve",
                    route: self.route(),
                });
            }
            let next = current.checked_add(1).ok_or_else(|| TreeError::Overflow {
                route: self.route(),
            })?;
            match counter.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(next),
                Err(actual) => current = actual,
            }
        }
    }

    /// Drop one owner.
    ///
    /// Returns `true` if this call destroyed the node. Destruction releases
    /// every child, possibly destroying whole subtrees; the first error met
    /// during that cascade is returned after the cascade has run to the end.
    pub fn release(&self) -> Result<bool> {
        if !self.decrement("release")? {
            return Ok(false);
        }
        destroy(self.clone())?;
        Ok(true)
    }

    /// Move the counter one owner down. Returns `true` on the transition to
    /// destroyed; does not run the cascade.
    fn decrement(&self, op: &'static str) -> Result<bool> {
        let counter = &self.0.reservations;
        let mut current = counter.load(Ordering::Acquire);
        loop {
            if current == DESTROYED {
                return Err(TreeError::Destroyed {
                    op,
                    route: self.route(),
                });
            }
            let next = if current <= 1 { DESTROYED } else { current - 1 };
            match counter.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(next == DESTROYED),
                Err(actual) => current = actual,
            }
        }
    }
}

/// Run the destroy hooks of a node whose count just reached [`DESTROYED`],
/// and of every descendant whose last owner it was.
///
/// Iterative, so arbitrarily deep trees cannot overflow the stack.
fn destroy(node: NodeRef) -> Result<()> {
    let mut pending = vec![node];
    let mut first_error = None;
    let mut destroyed = 0usize;

    while let Some(node) = pending.pop() {
        destroyed += 1;
        trace!(route = %node.route(), "destroying node");
        match &node.0.kind {
            NodeKind::Leaf(payload) => payload.read().on_destroy(),
            NodeKind::Internal { children, .. } => {
                let children = std::mem::take(&mut *children.write());
                for child in children.into_iter().flatten() {
                    match child.decrement("release") {
                        Ok(true) => pending.push(child),
                        Ok(false) => {}
                        Err(err) => {
                            warn!(route = %child.route(), error = %err, "child release failed during destroy");
                            first_error.get_or_insert(err);
                        }
                    }
                }
            }
        }
    }

    trace!(destroyed, "destroy cascade finished");
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Scoped ownership of a node.
///
/// Creating a guard reserves the node; cloning reserves it again; dropping
/// releases it. Useful when the owner is a Rust value (a cache entry, a
/// pending snapshot) rather than a parent slot.
///
/// A node with count 0 already has its implicit owner, so wrapping a freshly
/// created node adds a second owner. Use [`ReservedNode::adopt`] to take over
/// the implicit owner instead.
#[derive(Debug)]
pub struct ReservedNode {
    node: NodeRef,
}

impl ReservedNode {
    /// Reserve `node` and hold that reservation until drop.
    pub fn new(node: NodeRef) -> Result<Self> {
        node.reserve()?;
        Ok(Self { node })
    }

    /// Take over an ownership the caller already holds (for example the
    /// implicit owner of a fresh root) without reserving again.
    pub fn adopt(node: NodeRef) -> Result<Self> {
        if node.is_destroyed() {
            return Err(TreeError::Destroyed {
                op: "adopt",
                route: node.route(),
            });
        }
        Ok(Self { node })
    }

    /// The underlying handle.
    pub fn node(&self) -> &NodeRef {
        &self.node
    }
}

impl Deref for ReservedNode {
    type Target = NodeRef;

    fn deref(&self) -> &NodeRef {
        &self.node
    }
}

impl Clone for ReservedNode {
    /// # Panics
    ///
    /// Panics if the count overflows. The node cannot be destroyed while this
    /// guard holds it, so that is the only way reserving can fail here.
    fn clone(&self) -> Self {
        if let Err(err) = self.node.reserve() {
            panic!("cannot clone reservation: {err}");
        }
        Self {
            node: self.node.clone(),
        }
    }
}

impl Drop for ReservedNode {
    fn drop(&mut self) {
        if let Err(err) = self.node.release() {
            warn!(route = %self.node.route(), error = %err, "failed to release reserved node");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        build_less_simple_tree, generate_random_tree, internal, leaf, StringLeaf,
    };
    use crate::{adopt_children, fast_copy, replace_path, Route, TreeIterator};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use tracing_test::traced_test;

    #[test]
    fn test_reserve_and_release_counts() {
        let node = leaf("A");
        assert_eq!(node.reservation_count(), IMPLICIT_RESERVATION);

        assert_eq!(node.reserve().unwrap(), 1);
        assert_eq!(node.reserve().unwrap(), 2);
        assert!(!node.release().unwrap());
        assert_eq!(node.reservation_count(), 1);
        assert!(node.release().unwrap());
        assert!(node.is_destroyed());
        assert_eq!(node.reservation_count(), DESTROYED);
    }

    #[test]
    fn test_release_of_unreserved_node_destroys() {
        let node = leaf("A");
        assert!(node.release().unwrap());
        assert!(node.is_destroyed());
    }

    #[test]
    fn test_destroyed_rejects_reserve_and_release() {
        let node = internal();
        node.release().unwrap();
        assert!(matches!(
            node.reserve(),
            Err(TreeError::Destroyed { op: "reserve", .. })
        ));
        assert!(matches!(
            node.release(),
            Err(TreeError::Destroyed { op: "release", .. })
        ));
        assert_eq!(node.reservation_count(), DESTROYED);
    }

    #[test]
    #[traced_test]
    fn test_root_release_destroys_every_node_once() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let root = internal();
        let i0 = internal();
        for (index, name) in ["A", "B", "C"].into_iter().enumerate() {
            let payload = StringLeaf::with_counter(name, Arc::clone(&destroyed));
            i0.set_child(index, Some(NodeRef::leaf(payload))).unwrap();
        }
        root.set_child(0, Some(i0.clone())).unwrap();
        root.set_child(2, None).unwrap();

        assert!(root.release().unwrap());
        assert!(i0.is_destroyed());
        assert_eq!(destroyed.load(Ordering::SeqCst), 3);
        assert!(logs_contain("destroy cascade finished"));
    }

    #[test]
    fn test_shared_subtree_survives_one_owner() {
        let fixture = build_less_simple_tree();
        let root = fixture.root.clone().unwrap();
        let i0 = fixture.node("i0");
        let b = fixture.node("B");

        let other_version = internal();
        other_version.set_child(0, Some(i0.clone())).unwrap();
        assert_eq!(i0.reservation_count(), 2);

        root.release().unwrap();
        assert!(fixture.node("A").is_destroyed());
        assert!(fixture.node("D").is_destroyed());
        assert_eq!(i0.reservation_count(), 1);
        assert_eq!(b.reservation_count(), 1);

        other_version.release().unwrap();
        assert!(i0.is_destroyed());
        assert!(b.is_destroyed());
    }

    #[test]
    fn test_deep_chain_destroys_iteratively() {
        let root = internal();
        let mut tail = root.clone();
        for _ in 0..10_000 {
            let next = internal();
            tail.set_child(0, Some(next.clone())).unwrap();
            tail = next;
        }
        root.release().unwrap();
        assert!(tail.is_destroyed());
    }

    #[test]
    fn test_reserved_node_guard() {
        let node = leaf("A");
        node.reserve().unwrap();

        {
            let guard = ReservedNode::new(node.clone()).unwrap();
            assert_eq!(guard.reservation_count(), 2);
            let second = guard.clone();
            assert_eq!(second.reservation_count(), 3);
        }
        assert_eq!(node.reservation_count(), 1);
    }

    #[test]
    fn test_reserved_node_adopt_takes_implicit_owner() {
        let root = internal();
        let child = leaf("A");
        root.set_child(0, Some(child.clone())).unwrap();

        let guard = ReservedNode::adopt(root.clone()).unwrap();
        assert_eq!(guard.reservation_count(), 0);
        drop(guard);

        assert!(root.is_destroyed());
        assert!(child.is_destroyed());
    }

    #[test]
    fn test_reserved_node_rejects_destroyed() {
        let node = leaf("A");
        node.release().unwrap();
        assert!(ReservedNode::new(node.clone()).is_err());
        assert!(ReservedNode::adopt(node).is_err());
    }

    /// Every distinct node reachable from `roots`, each listed once.
    fn live_nodes(roots: &[&NodeRef]) -> Vec<NodeRef> {
        let mut seen: Vec<NodeRef> = Vec::new();
        let mut pending: Vec<NodeRef> = roots.iter().map(|root| (*root).clone()).collect();
        while let Some(node) = pending.pop() {
            if seen.contains(&node) {
                continue;
            }
            if node.is_internal() {
                pending.extend(node.children().unwrap().into_iter().flatten());
            }
            seen.push(node);
        }
        seen
    }

    /// Each node's count equals the number of parent slots holding it, so the
    /// counts of all versions together add up to the live edges.
    fn assert_counts_match_edges(roots: &[&NodeRef]) {
        let nodes = live_nodes(roots);
        let mut in_edges = vec![0i64; nodes.len()];
        for parent in nodes.iter().filter(|node| node.is_internal()) {
            for child in parent.children().unwrap().into_iter().flatten() {
                let index = nodes.iter().position(|node| *node == child).unwrap();
                in_edges[index] += 1;
            }
        }
        for (node, edges) in nodes.iter().zip(&in_edges) {
            assert_eq!(node.reservation_count(), *edges, "{node:?}");
        }
        for root in roots {
            assert_eq!(root.reservation_count(), IMPLICIT_RESERVATION);
        }
        let total: i64 = nodes.iter().map(NodeRef::reservation_count).sum();
        assert_eq!(total, in_edges.iter().sum::<i64>());
    }

    fn leaf_routes(root: &NodeRef) -> Vec<Route> {
        TreeIterator::new(Some(root))
            .filter(|node, _| node.is_some_and(NodeRef::is_leaf))
            .transform(|_, route| route.clone())
            .collect()
    }

    #[test]
    fn test_counts_track_edges_across_versions() {
        let mut rng = ChaCha8Rng::seed_from_u64(0xc0de);
        for seed in 0..10u64 {
            let destroyed = Arc::new(AtomicUsize::new(0));
            let tree = generate_random_tree(seed, 4, 4);
            let v1 = tree.root.clone().unwrap();
            for node in live_nodes(&[&v1]).iter().filter(|node| node.is_leaf()) {
                let payload = StringLeaf::with_counter("counted", Arc::clone(&destroyed));
                node.set_payload(Box::new(payload)).unwrap();
            }
            assert_counts_match_edges(&[&v1]);

            let v2 = fast_copy(&v1).unwrap();
            assert_counts_match_edges(&[&v1, &v2]);

            // A new node in v2 adopts the children of some internal node.
            let internals: Vec<NodeRef> = live_nodes(&[&v2])
                .into_iter()
                .filter(NodeRef::is_internal)
                .collect();
            let donor = &internals[rng.gen_range(0..internals.len())];
            let adopter = internal();
            adopt_children(donor, &adopter).unwrap();
            v2.set_child(v2.child_count().unwrap(), Some(adopter)).unwrap();
            assert_counts_match_edges(&[&v1, &v2]);

            for _ in 0..3 {
                let routes = leaf_routes(&v2);
                if routes.is_empty() {
                    break;
                }
                let route = &routes[rng.gen_range(0..routes.len())];
                replace_path(&v2, route, 0).unwrap();
                assert_counts_match_edges(&[&v1, &v2]);
            }

            let nodes = live_nodes(&[&v1, &v2]);
            let leaves = nodes.iter().filter(|node| node.is_leaf()).count();
            assert!(v1.release().unwrap());
            assert!(v2.release().unwrap());
            assert!(nodes.iter().all(NodeRef::is_destroyed));
            assert_eq!(destroyed.load(Ordering::SeqCst), leaves, "seed {seed}");
        }
    }
}
