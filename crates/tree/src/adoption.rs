//! Reparenting children without copying them.

use crate::error::{Result, TreeError};
use crate::node::NodeRef;
use tracing::debug;

/// Place every child of `old_parent` into the same slot of `new_parent`.
///
/// Each adopted child gains one reservation and stays attached to
/// `old_parent`, so it ends up shared by both. Its route is rewritten to the
/// position under `new_parent`. Slots of `new_parent` that `old_parent`
/// leaves empty are not touched. Returns the number of children adopted.
///
/// Both nodes must be internal and `new_parent` must accept mutation; nothing
/// is changed if either check fails.
pub fn adopt_children(old_parent: &NodeRef, new_parent: &NodeRef) -> Result<usize> {
    let children = old_parent.children()?;
    if !new_parent.is_internal() {
        return Err(TreeError::NotInternal {
            route: new_parent.route(),
        });
    }
    new_parent.guard_mutation("adopt_children")?;
    if let Some(dead) = children.iter().flatten().find(|child| child.is_destroyed()) {
        return Err(TreeError::Destroyed {
            op: "adopt",
            route: dead.route(),
        });
    }

    let mut adopted = 0;
    for (index, child) in children.into_iter().enumerate() {
        if let Some(child) = child {
            new_parent.set_child(index, Some(child))?;
            adopted += 1;
        }
    }

    debug!(
        from = %old_parent.route(),
        to = %new_parent.route(),
        adopted,
        "adopted children"
    );
    Ok(adopted)
}
