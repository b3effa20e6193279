//! Copy-on-write merkle state tree.
//!
//! This crate provides the in-memory tree that holds a node's state and lets
//! several versions of it coexist cheaply. A new version shares every
//! subtree it has not changed with the versions before it.
//!
//! # Architecture
//!
//! - [`NodeRef`]: handle to a leaf (application payload) or internal node
//!   (ordered child slots, possibly with holes). Every node carries a
//!   reservation count, its route, a cached digest and a freeze flag.
//! - Reservations: [`NodeRef::reserve`] / [`NodeRef::release`] count owners;
//!   releasing the last owner destroys the node and releases its children.
//!   [`ReservedNode`] does the same with RAII.
//! - [`fast_copy`]: start a new version whose root shares all children with
//!   the old root, and freeze the old root.
//! - [`replace_path`]: before changing a node, copy the shared part of the
//!   path down to it so the change stays private to one version.
//! - [`adopt_children`]: move the children of one node under another without
//!   copying them.
//! - [`TreeIterator`]: breadth-first, pre-, post- and reverse-post-ordered
//!   traversal with filters and null handling.
//! - [`hash_tree`] / [`invalidate_route`]: fill and clear digest caches using a
//!   caller-supplied [`DigestOracle`].
//! - [`NodeRegistry`]: rebuild nodes from class ids during deserialization.
//!
//! Each version is mutated by one thread at a time. Frozen versions can be
//! read from any thread while a newer version is being built.

mod adoption;
mod config;
mod error;
mod hashing;
mod iterator;
mod lifecycle;
mod navigation;
mod node;
mod registry;
mod replace;
mod snapshot;
mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use adoption::adopt_children;
pub use config::{IteratorConfig, ReplacementConfig, TreeConfig};
pub use error::{Result, TreeError};
pub use hashing::{hash_tree, invalidate_route, Blake3Digest, DigestOracle};
pub use iterator::{IterationOrder, Transformed, TreeIterator, Visit};
pub use lifecycle::{ReservedNode, DESTROYED, IMPLICIT_RESERVATION};
pub use navigation::{node_at_route, RouteIter};
pub use node::{LeafData, NodeRef};
pub use registry::{LeafFactory, NodeRegistry};
pub use replace::{replace_path, replace_path_with};
pub use snapshot::fast_copy;
pub use utils::{any_destroyed, count_nodes, is_tree_mutable, tree_depth};

pub use fastcopy_types::{build_route, Hash, Route};
