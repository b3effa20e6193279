//! Whole-version fast copies.

use crate::error::Result;
use crate::node::NodeRef;
use tracing::debug;

/// Start a new version of the tree rooted at `root`.
///
/// The returned root is a mutable copy sharing every child with `root` (each
/// child gains one reservation). `root` is frozen: it stays readable, and any
/// later change to the new version goes through
/// [`replace_path`](crate::replace_path), which copies whatever it touches.
///
/// A version can be fast-copied only once, so `root` must still be mutable.
/// The copy takes the place of `root` as the implicit owner of the new
/// version; release `root` when the old version is no longer needed.
pub fn fast_copy(root: &NodeRef) -> Result<NodeRef> {
    root.guard_mutation("fast_copy")?;
    let copy = root.copy()?;
    root.set_immutable(true)?;
    debug!(
        route = %root.route(),
        children = copy.child_count().unwrap_or(0),
        "fast copied version"
    );
    Ok(copy)
}
