//! Route-based lookups.

use crate::error::{Result, TreeError};
use crate::node::NodeRef;
use fastcopy_types::Route;

/// Node reached by walking `route` down from `start`.
///
/// The route is relative to `start`. Returns `Ok(None)` when a step lands on
/// a hole or past the end of a child list, and `Err(NotInternal)` when a step
/// would descend through a leaf.
pub fn node_at_route(start: &NodeRef, route: &Route) -> Result<Option<NodeRef>> {
    let mut walk = RouteIter::new(start, route.steps());
    let mut last = start.clone();
    for step in &mut walk {
        last = step?;
    }
    Ok(walk.is_complete().then_some(last))
}

/// Walks from a starting node down along child indices, yielding each node
/// entered (the starting node itself is not yielded).
///
/// Stops early, yielding nothing further, when a step lands on a hole or past
/// the end of a child list. Stepping through a leaf yields one
/// `Err(NotInternal)` and then stops.
pub struct RouteIter<I> {
    current: Option<NodeRef>,
    steps: I,
    taken: usize,
    complete: bool,
}

impl<I: Iterator<Item = usize>> RouteIter<I> {
    pub fn new(start: &NodeRef, steps: impl IntoIterator<Item = usize, IntoIter = I>) -> Self {
        Self {
            current: Some(start.clone()),
            steps: steps.into_iter(),
            taken: 0,
            complete: true,
        }
    }

    /// Number of steps successfully taken so far.
    pub fn depth(&self) -> usize {
        self.taken
    }

    /// False once the walk stopped before consuming every step.
    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

impl<I: Iterator<Item = usize>> Iterator for RouteIter<I> {
    type Item = Result<NodeRef>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current.take()?;
        let index = self.steps.next()?;
        match node.child(index) {
            Ok(Some(child)) => {
                self.taken += 1;
                self.current = Some(child.clone());
                Some(Ok(child))
            }
            Ok(None) => {
                self.complete = false;
                None
            }
            Err(err) => {
                self.complete = false;
                Some(Err(err))
            }
        }
    }
}

impl NodeRef {
    /// See [`node_at_route`].
    pub fn node_at(&self, route: &Route) -> Result<Option<NodeRef>> {
        node_at_route(self, route)
    }
}

/// Error for a route that stops reaching nodes after `depth` steps.
pub(crate) fn route_not_found(route: &Route, depth: usize) -> TreeError {
    TreeError::InvalidRoute {
        route: route.clone(),
        reason: format!("no node after {depth} of {} steps", route.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::build_less_simple_tree;
    use fastcopy_types::build_route;

    #[test]
    fn test_node_at_route_finds_every_node() {
        let fixture = build_less_simple_tree();
        let root = fixture.root.clone().unwrap();

        assert_eq!(root.node_at(&Route::root()).unwrap(), Some(root.clone()));
        for name in ["A", "i0", "B", "C", "i1", "D"] {
            let node = fixture.node(name);
            assert_eq!(
                node_at_route(&root, &node.route()).unwrap(),
                Some(node.clone()),
                "lookup of {name}"
            );
        }
    }

    #[test]
    fn test_node_at_route_relative_to_subtree() {
        let fixture = build_less_simple_tree();
        let i0 = fixture.node("i0");
        assert_eq!(
            node_at_route(&i0, &build_route(&[1])).unwrap(),
            Some(fixture.node("C"))
        );
    }

    #[test]
    fn test_missing_positions_are_none() {
        let fixture = build_less_simple_tree();
        let root = fixture.root.clone().unwrap();

        // Hole.
        assert_eq!(node_at_route(&root, &build_route(&[2, 1])).unwrap(), None);
        // Past the end.
        assert_eq!(node_at_route(&root, &build_route(&[7])).unwrap(), None);
        // Below a hole.
        assert_eq!(
            node_at_route(&root, &build_route(&[2, 1, 0])).unwrap(),
            None
        );
    }

    #[test]
    fn test_stepping_through_leaf_fails() {
        let fixture = build_less_simple_tree();
        let root = fixture.root.clone().unwrap();
        assert!(matches!(
            node_at_route(&root, &build_route(&[0, 0])),
            Err(TreeError::NotInternal { .. })
        ));
    }

    #[test]
    fn test_route_iter_yields_each_step() {
        let fixture = build_less_simple_tree();
        let root = fixture.root.clone().unwrap();

        let mut walk = RouteIter::new(&root, [2, 0]);
        let nodes: Vec<NodeRef> = (&mut walk).collect::<Result<_>>().unwrap();
        assert_eq!(nodes, vec![fixture.node("i1"), fixture.node("D")]);
        assert_eq!(walk.depth(), 2);
        assert!(walk.is_complete());

        let mut short = RouteIter::new(&root, [2, 1, 0]);
        assert_eq!(short.by_ref().count(), 1);
        assert!(!short.is_complete());
        assert_eq!(short.depth(), 1);
    }
}
