//! Copy-on-write path replacement.
//!
//! Before a version of the tree can be mutated at some position, every node
//! on the way down to that position must be exclusively owned by that version
//! and mutable. [`replace_path`] makes that so with the least copying: it
//! walks the path, finds the first node that is shared with another version
//! (or frozen), and copies from there down. Everything above the first shared
//! node is already private and is left as is, including its cached hash.
//!
//! Copying a node reserves its children once more, so the children of a copy
//! are shared by construction. That is why copying, once it starts, continues
//! to the end of the copied range.
//!
//! ```text
//!   before                          after replace_path(root, [2, 0], 0)
//!
//!   root                            root ──────────────┐
//!   ├── A                           ├── A              │ (old version)
//!   ├── i0                          ├── i0             i1 (count 1)
//!   └── i1 (count 2) ◄── old        └── i1' (fresh)    └── D (count 1)
//!       └── D                           └── D' (fresh)
//! ```

use crate::config::ReplacementConfig;
use crate::error::{Result, TreeError};
use crate::navigation::{route_not_found, RouteIter};
use crate::node::NodeRef;
use fastcopy_types::Route;
use tracing::{debug, trace};

/// [`replace_path_with`] using the default [`ReplacementConfig`].
pub fn replace_path(
    path_root: &NodeRef,
    target_route: &Route,
    levels_to_skip: usize,
) -> Result<Vec<NodeRef>> {
    replace_path_with(
        path_root,
        target_route,
        levels_to_skip,
        &ReplacementConfig::default(),
    )
}

/// Make every node from `path_root` down to `target_route` private to the
/// caller's version, copying only where a node is shared or frozen.
///
/// `target_route` is absolute and must be `path_root.route()` or a descendant
/// of it. The returned chain starts at `path_root` and ends at the node now
/// found at `target_route`; its length is
/// `target_route.len() - path_root.route().len() + 1`.
///
/// `path_root` itself is never copied. The last `levels_to_skip` nodes of the
/// chain are passed through as they are, copied or not; `levels_to_skip` must
/// be smaller than the chain length.
///
/// Every copy has an empty hash cache. Untouched nodes keep theirs; callers
/// recomputing the root hash should clear the caches above the copied range
/// (see [`invalidate_route`](crate::invalidate_route)).
///
/// The whole path is walked and every precondition checked before the first
/// splice, so on error the tree is left unchanged. With
/// [`ReplacementConfig::verify_routes`] set, the routes of the nodes above
/// the first copy are among those preconditions. Every node from the first
/// copy down, skipped levels included, is rerouted to its position on the
/// returned chain.
pub fn replace_path_with(
    path_root: &NodeRef,
    target_route: &Route,
    levels_to_skip: usize,
    config: &ReplacementConfig,
) -> Result<Vec<NodeRef>> {
    let root_route = path_root.route();
    if !root_route.is_ancestor_of(target_route) {
        return Err(TreeError::InvalidRoute {
            route: target_route.clone(),
            reason: format!("not a descendant of path root {root_route}"),
        });
    }

    let steps = target_route.steps().split_off(root_route.len());
    let mut path = collect_path(path_root, target_route, &steps)?;

    if levels_to_skip >= path.len() {
        return Err(TreeError::InvalidSkip {
            levels: levels_to_skip,
            path_len: path.len(),
        });
    }
    let copy_end = path.len() - 1 - levels_to_skip;

    let first = (1..=copy_end).find(|&depth| must_copy(&path[depth]));
    // Nodes above the first copy stay in place; the rest are rerouted below.
    let kept = first.unwrap_or(copy_end + 1);
    if config.verify_routes {
        verify_routes(&path[..kept], target_route, root_route.len())?;
    }

    if let Some(first) = first {
        // The node receiving the first copy is modified in place.
        path[first - 1].guard_mutation("replace_path")?;
        if let Some(dead) = path[first..=copy_end].iter().find(|node| node.is_destroyed()) {
            return Err(TreeError::Destroyed {
                op: "replace_path",
                route: dead.route(),
            });
        }

        for depth in first..=copy_end {
            let copy = path[depth].copy()?;
            copy.invalidate_hash();
            path[depth - 1].set_child(steps[depth - 1], Some(copy.clone()))?;
            path[depth] = copy;
        }

        debug!(
            target = %target_route,
            first_copied = first,
            copied = copy_end + 1 - first,
            skipped = levels_to_skip,
            "replaced path"
        );
    } else {
        trace!(target = %target_route, "path already private");
    }

    // A copy keeps its original's route, and a shared node may still report
    // the slot another version last gave it.
    for (depth, node) in path.iter().enumerate().skip(kept) {
        node.reroute(expected_route(target_route, root_route.len() + depth));
    }
    Ok(path)
}

fn must_copy(node: &NodeRef) -> bool {
    node.reservation_count() > 1 || node.is_immutable()
}

fn collect_path(path_root: &NodeRef, target_route: &Route, steps: &[usize]) -> Result<Vec<NodeRef>> {
    let mut path = Vec::with_capacity(steps.len() + 1);
    path.push(path_root.clone());

    let mut walk = RouteIter::new(path_root, steps.iter().copied());
    for node in &mut walk {
        let node = node.map_err(|_| TreeError::InvalidRoute {
            route: target_route.clone(),
            reason: format!("descends through a leaf after {} steps", path.len() - 1),
        })?;
        path.push(node);
    }
    if !walk.is_complete() {
        return Err(route_not_found(target_route, walk.depth()));
    }
    Ok(path)
}

fn expected_route(target_route: &Route, len: usize) -> Route {
    target_route.ancestor(len).unwrap_or_else(Route::root)
}

/// Check that the nodes of `path`, which starts `root_len` steps below the
/// root, report the routes of their positions on the way to `target_route`.
fn verify_routes(path: &[NodeRef], target_route: &Route, root_len: usize) -> Result<()> {
    for (depth, node) in path.iter().enumerate() {
        let expected = expected_route(target_route, root_len + depth);
        let actual = node.route();
        if actual != expected {
            return Err(TreeError::RouteMismatch { expected, actual });
        }
    }
    Ok(())
}
