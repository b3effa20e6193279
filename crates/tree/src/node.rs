//! Merkle tree nodes.
//!
//! A node is either a leaf, holding an application payload, or an internal
//! node, holding an ordered list of child slots that may contain holes.
//! Every node carries a reservation count (see [`crate::lifecycle`]), the
//! route it currently sits at, a memoized digest and a freeze flag.
//!
//! [`NodeRef`] is a cheap handle to a node. Cloning or dropping a handle never
//! changes the reservation count; parent slots own reservations, handles only
//! observe. All in-place mutation goes through one guarded entry point that
//! rejects destroyed, frozen and shared nodes.

use crate::error::{Result, TreeError};
use crate::lifecycle::{DESTROYED, IMPLICIT_RESERVATION};
use fastcopy_types::{Hash, Route};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Payload contract for leaf nodes.
///
/// Implemented by the state-object layer. The engine never interprets the
/// payload; it only copies it when a leaf is copied, hands its bytes to the
/// digest oracle and serializers, and calls [`on_destroy`](Self::on_destroy)
/// once when the owning leaf is destroyed.
pub trait LeafData: fmt::Debug + Send + Sync + 'static {
    /// Type tag used by [`NodeRegistry`](crate::NodeRegistry) to rebuild the payload.
    fn class_id(&self) -> u64;

    /// An independent copy. The copy must not share mutable state with `self`.
    fn copy(&self) -> Box<dyn LeafData>;

    /// Canonical bytes, used for hashing and serialization.
    fn to_bytes(&self) -> Vec<u8>;

    /// Called exactly once, when the leaf holding this payload is destroyed.
    fn on_destroy(&self) {}

    /// Downcasting support.
    fn as_any(&self) -> &dyn Any;
}

type Children = Vec<Option<NodeRef>>;

pub(crate) enum NodeKind {
    Leaf(RwLock<Box<dyn LeafData>>),
    Internal {
        class_id: u64,
        children: RwLock<Children>,
    },
}

pub(crate) struct Node {
    pub(crate) reservations: AtomicI64,
    route: RwLock<Route>,
    hash: Mutex<Option<Hash>>,
    immutable: AtomicBool,
    pub(crate) kind: NodeKind,
}

/// Handle to a tree node.
///
/// Equality is identity: two handles are equal when they point at the same
/// node object, regardless of content.
#[derive(Clone)]
pub struct NodeRef(pub(crate) Arc<Node>);

impl NodeRef {
    fn new(kind: NodeKind, route: Route) -> Self {
        Self(Arc::new(Node {
            reservations: AtomicI64::new(IMPLICIT_RESERVATION),
            route: RwLock::new(route),
            hash: Mutex::new(None),
            immutable: AtomicBool::new(false),
            kind,
        }))
    }

    /// Create a detached leaf holding `payload`.
    pub fn leaf(payload: impl LeafData) -> Self {
        Self::leaf_boxed(Box::new(payload))
    }

    /// Create a detached leaf from an already boxed payload.
    pub fn leaf_boxed(payload: Box<dyn LeafData>) -> Self {
        Self::new(NodeKind::Leaf(RwLock::new(payload)), Route::root())
    }

    /// Create a detached internal node with no children.
    pub fn internal(class_id: u64) -> Self {
        Self::new(
            NodeKind::Internal {
                class_id,
                children: RwLock::new(Vec::new()),
            },
            Route::root(),
        )
    }

    /// Create an internal node and attach `children` at indices 0, 1, ...
    pub fn internal_with(
        class_id: u64,
        children: impl IntoIterator<Item = Option<NodeRef>>,
    ) -> Result<Self> {
        let node = Self::internal(class_id);
        for (index, child) in children.into_iter().enumerate() {
            node.set_child(index, child)?;
        }
        Ok(node)
    }

    /// True if both handles point at the same node object.
    pub fn ptr_eq(a: &NodeRef, b: &NodeRef) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.0.kind, NodeKind::Leaf(_))
    }

    pub fn is_internal(&self) -> bool {
        matches!(self.0.kind, NodeKind::Internal { .. })
    }

    /// Type tag of the node (the payload's tag for leaves).
    pub fn class_id(&self) -> u64 {
        match &self.0.kind {
            NodeKind::Leaf(payload) => payload.read().class_id(),
            NodeKind::Internal { class_id, .. } => *class_id,
        }
    }

    /// Route from the root of the tree that last attached this node.
    ///
    /// A node shared by several tree versions reports the route of its most
    /// recent attachment. Routes read from nodes are only meaningful within
    /// one coherent traversal of one version; do not cache them across
    /// structural operations.
    pub fn route(&self) -> Route {
        self.0.route.read().clone()
    }

    pub(crate) fn set_route(&self, route: Route) {
        *self.0.route.write() = route;
    }

    /// Move this node and its subtree to `route`, rewriting every descendant
    /// whose route differs. Does nothing if the node already reports `route`.
    pub(crate) fn reroute(&self, route: Route) {
        assign_route(self, route);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Hash cache
    // ═══════════════════════════════════════════════════════════════════════

    /// Cached digest, or `None` if it must be recomputed.
    pub fn hash(&self) -> Option<Hash> {
        *self.0.hash.lock()
    }

    /// Store a freshly computed digest.
    ///
    /// Allowed on frozen and shared nodes: the digest describes content that
    /// is identical in every version referencing the node.
    pub fn set_hash(&self, hash: Hash) {
        *self.0.hash.lock() = Some(hash);
    }

    /// Mark the cached digest dirty.
    pub fn invalidate_hash(&self) {
        *self.0.hash.lock() = None;
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Mutability
    // ═══════════════════════════════════════════════════════════════════════

    pub fn is_immutable(&self) -> bool {
        self.0.immutable.load(Ordering::Acquire)
    }

    /// Freeze (`true`) the node. Freezing is permanent: asking to unfreeze a
    /// frozen node fails, and unfreezing a mutable node is a no-op.
    pub fn set_immutable(&self, immutable: bool) -> Result<()> {
        if immutable {
            self.0.immutable.store(true, Ordering::Release);
            Ok(())
        } else if self.is_immutable() {
            Err(TreeError::Immutable {
                op: "unfreeze",
                route: self.route(),
            })
        } else {
            Ok(())
        }
    }

    /// Fail if the node is frozen.
    pub fn ensure_mutable(&self) -> Result<()> {
        self.ensure_mutable_for("mutate")
    }

    fn ensure_mutable_for(&self, op: &'static str) -> Result<()> {
        if self.is_immutable() {
            return Err(TreeError::Immutable {
                op,
                route: self.route(),
            });
        }
        Ok(())
    }

    /// Single gate for every in-place change: the node must be alive, not
    /// frozen, and owned by at most one parent slot.
    pub(crate) fn guard_mutation(&self, op: &'static str) -> Result<()> {
        let reservations = self.reservation_count();
        if reservations == DESTROYED {
            return Err(TreeError::Destroyed {
                op,
                route: self.route(),
            });
        }
        self.ensure_mutable_for(op)?;
        if reservations > 1 {
            return Err(TreeError::Shared {
                op,
                route: self.route(),
                reservations,
            });
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Children
    // ═══════════════════════════════════════════════════════════════════════

    fn children_lock(&self) -> Result<&RwLock<Children>> {
        match &self.0.kind {
            NodeKind::Internal { children, .. } => Ok(children),
            NodeKind::Leaf(_) => Err(TreeError::NotInternal {
                route: self.route(),
            }),
        }
    }

    /// Number of child slots, holes included.
    pub fn child_count(&self) -> Result<usize> {
        Ok(self.children_lock()?.read().len())
    }

    /// Child at `index`; `None` for a hole or an index past the end.
    pub fn child(&self, index: usize) -> Result<Option<NodeRef>> {
        Ok(self.children_lock()?.read().get(index).cloned().flatten())
    }

    /// Snapshot of all child slots.
    pub fn children(&self) -> Result<Vec<Option<NodeRef>>> {
        Ok(self.children_lock()?.read().clone())
    }

    /// Place `child` in slot `index`, growing the slot list with holes if needed.
    ///
    /// The incoming child is reserved and moved to `self.route() + index`
    /// before the outgoing child is released, so re-setting the same child is
    /// harmless. Hash caches are left alone; invalidation is the caller's job.
    pub fn set_child(&self, index: usize, child: Option<NodeRef>) -> Result<()> {
        self.guard_mutation("set_child")?;
        let slots = self.children_lock()?;

        if let Some(child) = &child {
            child.reserve()?;
            assign_route(child, self.route().extend(index));
        }

        let previous = {
            let mut slots = slots.write();
            if index >= slots.len() {
                slots.resize(index + 1, None);
            }
            std::mem::replace(&mut slots[index], child)
        };

        if let Some(previous) = previous {
            previous.release()?;
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Payload
    // ═══════════════════════════════════════════════════════════════════════

    fn payload_lock(&self) -> Result<&RwLock<Box<dyn LeafData>>> {
        match &self.0.kind {
            NodeKind::Leaf(payload) => Ok(payload),
            NodeKind::Internal { .. } => Err(TreeError::NotLeaf {
                route: self.route(),
            }),
        }
    }

    /// Run `f` against the leaf payload.
    pub fn with_payload<R>(&self, f: impl FnOnce(&dyn LeafData) -> R) -> Result<R> {
        let payload = self.payload_lock()?.read();
        Ok(f(&**payload))
    }

    /// Canonical payload bytes of a leaf.
    pub fn payload_bytes(&self) -> Result<Vec<u8>> {
        self.with_payload(|payload| payload.to_bytes())
    }

    /// Clone of the payload if it has concrete type `T`.
    pub fn payload_as<T: LeafData + Clone>(&self) -> Result<Option<T>> {
        self.with_payload(|payload| payload.as_any().downcast_ref::<T>().cloned())
    }

    /// Swap the leaf payload, returning the previous one.
    pub fn set_payload(&self, payload: Box<dyn LeafData>) -> Result<Box<dyn LeafData>> {
        self.guard_mutation("set_payload")?;
        let lock = self.payload_lock()?;
        Ok(std::mem::replace(&mut *lock.write(), payload))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Copying
    // ═══════════════════════════════════════════════════════════════════════

    /// Shallow copy.
    ///
    /// A leaf copy gets an independent payload copy. An internal copy points
    /// at the same child objects, each reserved once more. The copy keeps the
    /// original's route object, starts with an empty hash cache, is mutable,
    /// and has no owner yet.
    pub fn copy(&self) -> Result<NodeRef> {
        if self.is_destroyed() {
            return Err(TreeError::Destroyed {
                op: "copy",
                route: self.route(),
            });
        }

        let kind = match &self.0.kind {
            NodeKind::Leaf(payload) => NodeKind::Leaf(RwLock::new(payload.read().copy())),
            NodeKind::Internal { class_id, children } => {
                let children = children.read().clone();
                reserve_all(&children)?;
                NodeKind::Internal {
                    class_id: *class_id,
                    children: RwLock::new(children),
                }
            }
        };
        Ok(NodeRef::new(kind, self.route()))
    }
}

/// Reserve every present child, undoing partial work on failure.
fn reserve_all(children: &[Option<NodeRef>]) -> Result<()> {
    for (index, child) in children.iter().enumerate() {
        let Some(child) = child else { continue };
        if let Err(err) = child.reserve() {
            for reserved in children[..index].iter().flatten() {
                // Just reserved above, so these releases only decrement.
                if let Err(rollback) = reserved.release() {
                    warn!(
                        route = %reserved.route(),
                        error = %rollback,
                        "rollback release failed during copy"
                    );
                }
            }
            return Err(err);
        }
    }
    Ok(())
}

/// Move a subtree to `route`, rewriting descendants whose route changes.
///
/// A node already reporting an equal route keeps its route object, and its
/// subtree is assumed consistent.
fn assign_route(node: &NodeRef, route: Route) {
    let mut pending = vec![(node.clone(), route)];
    while let Some((node, route)) = pending.pop() {
        if node.route() == route {
            continue;
        }
        if let NodeKind::Internal { children, .. } = &node.0.kind {
            for (index, child) in children.read().iter().enumerate() {
                if let Some(child) = child {
                    pending.push((child.clone(), route.extend(index)));
                }
            }
        }
        node.set_route(route);
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        NodeRef::ptr_eq(self, other)
    }
}

impl Eq for NodeRef {}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = if self.is_leaf() { "Leaf" } else { "Internal" };
        f.debug_struct(name)
            .field("class_id", &self.class_id())
            .field("route", &self.route())
            .field("reservations", &self.reservation_count())
            .field("immutable", &self.is_immutable())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{internal, leaf, StringLeaf, STRING_LEAF_CLASS_ID};
    use fastcopy_types::build_route;
    use tracing_test::traced_test;

    fn value(node: &NodeRef) -> String {
        node.payload_as::<StringLeaf>().unwrap().unwrap().value().to_string()
    }

    #[test]
    fn test_node_ref_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NodeRef>();
    }

    #[test]
    fn test_new_nodes() {
        let a = leaf("A");
        assert!(a.is_leaf());
        assert_eq!(a.class_id(), STRING_LEAF_CLASS_ID);
        assert_eq!(a.reservation_count(), 0);
        assert_eq!(a.route(), Route::root());
        assert_eq!(a.hash(), None);
        assert!(!a.is_immutable());
        assert_eq!(a.payload_bytes().unwrap(), b"A".to_vec());

        let i = internal();
        assert!(i.is_internal());
        assert_eq!(i.child_count().unwrap(), 0);
        assert_eq!(i.child(3).unwrap(), None);
    }

    #[test]
    fn test_kind_mismatch_errors() {
        let a = leaf("A");
        assert!(matches!(a.child(0), Err(TreeError::NotInternal { .. })));
        assert!(matches!(
            a.set_child(0, None),
            Err(TreeError::NotInternal { .. })
        ));

        let i = internal();
        assert!(matches!(i.payload_bytes(), Err(TreeError::NotLeaf { .. })));
    }

    #[test]
    fn test_set_child_reserves_routes_and_grows() {
        let root = internal();
        let a = leaf("A");
        let i0 = internal();
        let b = leaf("B");

        root.set_child(0, Some(a.clone())).unwrap();
        root.set_child(1, Some(i0.clone())).unwrap();
        i0.set_child(0, Some(b.clone())).unwrap();
        root.set_child(3, None).unwrap();

        assert_eq!(root.child_count().unwrap(), 4);
        assert_eq!(root.child(2).unwrap(), None);
        assert_eq!(a.reservation_count(), 1);
        assert_eq!(i0.reservation_count(), 1);
        assert_eq!(a.route(), build_route(&[0]));
        assert_eq!(b.route(), build_route(&[1, 0]));
        assert_eq!(root.child(1).unwrap(), Some(i0));
    }

    #[test]
    fn test_set_child_moves_subtree_routes() {
        let i0 = internal();
        let b = leaf("B");
        i0.set_child(1, Some(b.clone())).unwrap();
        assert_eq!(b.route(), build_route(&[1]));

        let root = internal();
        root.set_child(2, Some(i0.clone())).unwrap();
        assert_eq!(i0.route(), build_route(&[2]));
        assert_eq!(b.route(), build_route(&[2, 1]));
    }

    #[test]
    fn test_replacing_child_releases_previous() {
        let root = internal();
        let a = leaf("A");
        let b = leaf("B");

        root.set_child(0, Some(a.clone())).unwrap();
        root.set_child(0, Some(b.clone())).unwrap();

        assert!(a.is_destroyed());
        assert_eq!(b.reservation_count(), 1);

        // Setting the same child again is a no-op for its count.
        root.set_child(0, Some(b.clone())).unwrap();
        assert_eq!(b.reservation_count(), 1);

        root.set_child(0, None).unwrap();
        assert!(b.is_destroyed());
    }

    #[test]
    fn test_mutation_guard() {
        let root = internal();
        root.set_immutable(true).unwrap();
        assert!(matches!(
            root.set_child(0, Some(leaf("A"))),
            Err(TreeError::Immutable { op: "set_child", .. })
        ));
        assert_eq!(root.child_count().unwrap(), 0);

        let shared = internal();
        let p1 = internal();
        let p2 = internal();
        p1.set_child(0, Some(shared.clone())).unwrap();
        p2.set_child(0, Some(shared.clone())).unwrap();
        let incoming = leaf("X");
        assert!(matches!(
            shared.set_child(0, Some(incoming.clone())),
            Err(TreeError::Shared {
                reservations: 2,
                ..
            })
        ));
        assert_eq!(incoming.reservation_count(), 0);

        let dead = internal();
        dead.release().unwrap();
        assert!(matches!(
            dead.set_child(0, None),
            Err(TreeError::Destroyed { .. })
        ));
    }

    #[test]
    fn test_freeze_is_permanent() {
        let a = leaf("A");
        a.set_immutable(false).unwrap();
        assert!(a.ensure_mutable().is_ok());

        a.set_immutable(true).unwrap();
        assert!(a.is_immutable());
        assert!(matches!(
            a.ensure_mutable(),
            Err(TreeError::Immutable { .. })
        ));
        assert!(matches!(
            a.set_immutable(false),
            Err(TreeError::Immutable { op: "unfreeze", .. })
        ));
        assert!(matches!(
            a.set_payload(Box::new(StringLeaf::new("B"))),
            Err(TreeError::Immutable { .. })
        ));
    }

    #[test]
    fn test_hash_cache() {
        let a = leaf("A");
        let digest = Hash::from_bytes(b"A");
        a.set_hash(digest);
        assert_eq!(a.hash(), Some(digest));
        a.invalidate_hash();
        assert_eq!(a.hash(), None);
    }

    #[test]
    fn test_leaf_copy_is_independent() {
        let a = leaf("A");
        a.set_hash(Hash::from_bytes(b"A"));
        let copy = a.copy().unwrap();

        assert_ne!(copy, a);
        assert_eq!(copy.hash(), None);
        assert_eq!(copy.reservation_count(), 0);

        copy.set_payload(Box::new(StringLeaf::new("changed"))).unwrap();
        assert_eq!(value(&a), "A");
        assert_eq!(value(&copy), "changed");
    }

    #[test]
    fn test_internal_copy_shares_children() {
        let root = internal();
        let i0 = internal();
        let b = leaf("B");
        let c = leaf("C");
        root.set_child(0, Some(i0.clone())).unwrap();
        i0.set_child(0, Some(b.clone())).unwrap();
        i0.set_child(1, Some(c.clone())).unwrap();

        let copy = i0.copy().unwrap();
        assert!(Route::ptr_eq(&copy.route(), &i0.route()));
        assert_eq!(copy.child(0).unwrap(), Some(b.clone()));
        assert_eq!(b.reservation_count(), 2);
        assert_eq!(c.reservation_count(), 2);

        // Replacing a child of the copy leaves the original untouched.
        let d = leaf("D");
        copy.set_child(0, Some(d.clone())).unwrap();
        assert_eq!(i0.child(0).unwrap(), Some(b.clone()));
        assert_eq!(b.reservation_count(), 1);

        copy.release().unwrap();
        assert!(d.is_destroyed());
        assert_eq!(c.reservation_count(), 1);
        assert!(!i0.is_destroyed());
    }

    #[test]
    fn test_copy_of_destroyed_node_fails() {
        let a = leaf("A");
        a.release().unwrap();
        assert!(matches!(a.copy(), Err(TreeError::Destroyed { .. })));
    }

    #[test]
    #[traced_test]
    fn test_failed_copy_rolls_back_child_reservations() {
        let parent = internal();
        let a = leaf("A");
        let b = leaf("B");
        parent.set_child(0, Some(a.clone())).unwrap();
        parent.set_child(1, Some(b.clone())).unwrap();
        // B dies while its slot still holds it.
        b.reserve().unwrap();
        b.release().unwrap();
        b.release().unwrap();
        assert!(b.is_destroyed());

        assert!(matches!(
            parent.copy(),
            Err(TreeError::Destroyed { op: "reserve", .. })
        ));
        assert_eq!(a.reservation_count(), 1);
        assert!(!logs_contain("rollback release failed"));
    }

    #[test]
    fn test_handles_compare_by_identity() {
        let a = leaf("A");
        let same = a.clone();
        let other = leaf("A");
        assert_eq!(a, same);
        assert_ne!(a, other);
        assert_eq!(same.reservation_count(), 0);
    }
}
