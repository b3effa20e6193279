//! Routes: addresses of nodes within a merkle tree.
//!
//! A route is the sequence of child indices taken from a tree's root to reach
//! a node. Routes are immutable persistent lists: extending a route allocates
//! a single step that points back at its parent route, so every node in a
//! subtree shares the prefix object of the subtree root's route. Cloning a
//! route is a reference count bump.
//!
//! Equality and hashing are by value, so routes computed independently on two
//! versions of a tree compare equal when they name the same logical position.

use std::fmt;
use std::hash::{Hash as StdHash, Hasher};
use std::sync::Arc;

/// Immutable child-index path from a tree root to a node.
#[derive(Clone, Default)]
pub struct Route(Option<Arc<RouteStep>>);

struct RouteStep {
    parent: Route,
    index: usize,
    len: usize,
}

impl Route {
    /// The route of a tree root (no steps).
    pub fn root() -> Self {
        Self(None)
    }

    /// Number of steps in this route.
    pub fn len(&self) -> usize {
        self.0.as_ref().map_or(0, |step| step.len)
    }

    /// True for the route of a tree root.
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Route to the `index`-th child of the node at this route.
    pub fn extend(&self, index: usize) -> Route {
        Route(Some(Arc::new(RouteStep {
            parent: self.clone(),
            index,
            len: self.len() + 1,
        })))
    }

    /// Route of the parent node, or `None` for the root route.
    pub fn parent(&self) -> Option<Route> {
        self.0.as_ref().map(|step| step.parent.clone())
    }

    /// Index of the node within its parent, or `None` for the root route.
    pub fn last_index(&self) -> Option<usize> {
        self.0.as_ref().map(|step| step.index)
    }

    /// The prefix of this route with exactly `len` steps.
    ///
    /// The returned route shares its storage with `self`. Returns `None` when
    /// `len` is longer than this route.
    pub fn ancestor(&self, len: usize) -> Option<Route> {
        let mut current = self;
        if len > current.len() {
            return None;
        }
        while current.len() > len {
            current = &current.0.as_ref()?.parent;
        }
        Some(current.clone())
    }

    /// Child indices from the root down.
    pub fn steps(&self) -> Vec<usize> {
        let mut steps = Vec::with_capacity(self.len());
        let mut current = self;
        while let Some(step) = &current.0 {
            steps.push(step.index);
            current = &step.parent;
        }
        steps.reverse();
        steps
    }

    /// True if `self` is a prefix of `other` (a route is its own ancestor).
    pub fn is_ancestor_of(&self, other: &Route) -> bool {
        other
            .ancestor(self.len())
            .is_some_and(|prefix| prefix == *self)
    }

    /// True if `other` is a prefix of `self`.
    pub fn is_descendant_of(&self, other: &Route) -> bool {
        other.is_ancestor_of(self)
    }

    /// True if both routes are the same object (not merely equal).
    pub fn ptr_eq(a: &Route, b: &Route) -> bool {
        match (&a.0, &b.0) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Build a route from child indices given root first.
pub fn build_route(steps: &[usize]) -> Route {
    steps.iter().copied().collect()
}

impl FromIterator<usize> for Route {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Route::root(), |route, index| route.extend(index))
    }
}

impl PartialEq for Route {
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        let (mut a, mut b) = (self, other);
        loop {
            if Route::ptr_eq(a, b) {
                return true;
            }
            match (&a.0, &b.0) {
                (Some(x), Some(y)) => {
                    if x.index != y.index {
                        return false;
                    }
                    a = &x.parent;
                    b = &y.parent;
                }
                // Equal lengths, so both run out together.
                _ => return true,
            }
        }
    }
}

impl Eq for Route {}

impl StdHash for Route {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.len().hash(state);
        let mut current = self;
        while let Some(step) = &current.0 {
            step.index.hash(state);
            current = &step.parent;
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Route{:?}", self.steps())
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps: Vec<String> = self.steps().iter().map(|s| s.to_string()).collect();
        write!(f, "[{}]", steps.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_root_route() {
        let root = Route::root();
        assert!(root.is_empty());
        assert_eq!(root.len(), 0);
        assert_eq!(root.parent(), None);
        assert_eq!(root.last_index(), None);
        assert_eq!(root, build_route(&[]));
    }

    #[test]
    fn test_build_and_steps() {
        let route = build_route(&[2, 0, 7]);
        assert_eq!(route.len(), 3);
        assert_eq!(route.steps(), vec![2, 0, 7]);
        assert_eq!(route.last_index(), Some(7));
        assert_eq!(route.parent(), Some(build_route(&[2, 0])));
        assert_eq!(format!("{}", route), "[2, 0, 7]");
        assert_eq!(format!("{:?}", route), "Route[2, 0, 7]");
    }

    #[test]
    fn test_value_equality_across_independent_routes() {
        let a = Route::root().extend(1).extend(3);
        let b = build_route(&[1, 3]);
        assert_eq!(a, b);
        assert!(!Route::ptr_eq(&a, &b));

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));

        assert_ne!(build_route(&[1, 3]), build_route(&[3, 1]));
        assert_ne!(build_route(&[1]), build_route(&[1, 0]));
    }

    #[test]
    fn test_extension_shares_prefix() {
        let parent = build_route(&[4, 4]);
        let child = parent.extend(1);
        let prefix = child.ancestor(2).unwrap();
        assert!(Route::ptr_eq(&prefix, &parent));
        assert!(Route::ptr_eq(&child.parent().unwrap(), &parent));
    }

    #[test]
    fn test_ancestry() {
        let root = Route::root();
        let a = build_route(&[1]);
        let ab = build_route(&[1, 2]);
        let other = build_route(&[2, 2]);

        assert!(root.is_ancestor_of(&ab));
        assert!(a.is_ancestor_of(&ab));
        assert!(ab.is_ancestor_of(&ab));
        assert!(!ab.is_ancestor_of(&a));
        assert!(!other.is_ancestor_of(&ab));
        assert!(!build_route(&[2]).is_ancestor_of(&ab));

        assert!(ab.is_descendant_of(&a));
        assert!(!a.is_descendant_of(&ab));

        assert_eq!(ab.ancestor(3), None);
        assert_eq!(ab.ancestor(0), Some(Route::root()));
    }
}
