//! Hash cache plumbing.
//!
//! Nodes only memoize digests; computing them is delegated to a
//! [`DigestOracle`]. [`hash_tree`] fills every empty cache of a version in
//! post order and never descends into a subtree whose root already has a
//! hash, so regions shared with an earlier, hashed version cost nothing.

use crate::error::{Result, TreeError};
use crate::iterator::{IterationOrder, TreeIterator};
use crate::navigation::{route_not_found, RouteIter};
use crate::node::NodeRef;
use fastcopy_types::{Hash, Route};
use tracing::trace;

/// Digest function for tree content.
pub trait DigestOracle {
    /// Digest of a leaf from its class id and payload bytes.
    fn digest_leaf(&self, class_id: u64, payload: &[u8]) -> Hash;

    /// Digest of an internal node from its class id and the digests of its
    /// child slots, with [`Hash::ZERO`] standing in for empty slots.
    fn digest_internal(&self, class_id: u64, children: &[Hash]) -> Hash;
}

/// Blake3 digests with separate domains for leaves and internal nodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Digest;

const LEAF_DOMAIN: &[u8] = b"fastcopy:leaf:";
const INTERNAL_DOMAIN: &[u8] = b"fastcopy:internal:";

impl DigestOracle for Blake3Digest {
    fn digest_leaf(&self, class_id: u64, payload: &[u8]) -> Hash {
        Hash::from_parts(&[LEAF_DOMAIN, &class_id.to_le_bytes(), payload])
    }

    fn digest_internal(&self, class_id: u64, children: &[Hash]) -> Hash {
        let class_id = class_id.to_le_bytes();
        let mut parts: Vec<&[u8]> = Vec::with_capacity(children.len() + 2);
        parts.push(INTERNAL_DOMAIN);
        parts.push(&class_id);
        parts.extend(children.iter().map(|hash| hash.as_bytes().as_slice()));
        Hash::from_parts(&parts)
    }
}

/// Compute and cache the digest of every node under `root` whose cache is
/// empty, returning the root digest.
pub fn hash_tree(root: &NodeRef, oracle: &impl DigestOracle) -> Result<Hash> {
    let mut computed = 0usize;
    let dirty = TreeIterator::new(Some(root))
        .order(IterationOrder::PostOrderedDepthFirst)
        .filter(|node, _| node.is_some_and(|node| node.hash().is_none()))
        .descendant_filter(|node, _| node.hash().is_none());

    for visit in dirty {
        let Some(node) = visit.node else { continue };
        let hash = if node.is_leaf() {
            oracle.digest_leaf(node.class_id(), &node.payload_bytes()?)
        } else {
            let children = node
                .children()?
                .iter()
                .enumerate()
                .map(|(index, child)| match child {
                    None => Ok(Hash::ZERO),
                    Some(child) => child.hash().ok_or_else(|| TreeError::MissingHash {
                        route: visit.route.extend(index),
                    }),
                })
                .collect::<Result<Vec<_>>>()?;
            oracle.digest_internal(node.class_id(), &children)
        };
        node.set_hash(hash);
        computed += 1;
    }

    let root_hash = root
        .hash()
        .ok_or_else(|| TreeError::MissingHash { route: root.route() })?;
    trace!(route = %root.route(), computed, hash = %root_hash, "hashed tree");
    Ok(root_hash)
}

/// Clear the hash cache of every node from `path_root` down to the node at
/// the absolute route `target`, both included.
///
/// After [`replace_path`](crate::replace_path) the copied nodes already have
/// empty caches; this clears the untouched prefix above them so the next
/// [`hash_tree`] recomputes the root.
pub fn invalidate_route(path_root: &NodeRef, target: &Route) -> Result<()> {
    let root_route = path_root.route();
    if !root_route.is_ancestor_of(target) {
        return Err(TreeError::InvalidRoute {
            route: target.clone(),
            reason: format!("not a descendant of path root {root_route}"),
        });
    }

    let steps = target.steps().split_off(root_route.len());
    let mut path = vec![path_root.clone()];
    let mut walk = RouteIter::new(path_root, steps);
    for node in &mut walk {
        path.push(node?);
    }
    if !walk.is_complete() {
        return Err(route_not_found(target, walk.depth()));
    }

    for node in &path {
        node.invalidate_hash();
    }
    Ok(())
}
