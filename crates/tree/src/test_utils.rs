//! Fixtures for tests: a string payload, canonical small trees, and seeded
//! random trees.
//!
//! Available to this crate's tests and, behind the `test-utils` feature, to
//! downstream crates.

use crate::error::{Result, TreeError};
use crate::iterator::Visit;
use crate::node::{LeafData, NodeRef};
use crate::registry::NodeRegistry;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Class id of [`StringLeaf`].
pub const STRING_LEAF_CLASS_ID: u64 = 0x5354_5249_4e47;

/// Class id used for internal nodes built by the fixtures.
pub const TEST_INTERNAL_CLASS_ID: u64 = 0x494e_5445_524e;

/// Leaf payload holding a string, optionally counting destructions.
#[derive(Debug, Clone)]
pub struct StringLeaf {
    value: String,
    destroyed: Option<Arc<AtomicUsize>>,
}

impl StringLeaf {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            destroyed: None,
        }
    }

    /// A payload that bumps `counter` when its leaf is destroyed.
    pub fn with_counter(value: impl Into<String>, counter: Arc<AtomicUsize>) -> Self {
        Self {
            value: value.into(),
            destroyed: Some(counter),
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl LeafData for StringLeaf {
    fn class_id(&self) -> u64 {
        STRING_LEAF_CLASS_ID
    }

    fn copy(&self) -> Box<dyn LeafData> {
        Box::new(self.clone())
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.value.as_bytes().to_vec()
    }

    fn on_destroy(&self) {
        if let Some(counter) = &self.destroyed {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Detached leaf holding `value`.
pub fn leaf(value: &str) -> NodeRef {
    NodeRef::leaf(StringLeaf::new(value))
}

/// Detached, empty internal node.
pub fn internal() -> NodeRef {
    NodeRef::internal(TEST_INTERNAL_CLASS_ID)
}

/// Registry knowing [`StringLeaf`] and the fixture internal class.
pub fn test_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    registry
        .register_leaf(STRING_LEAF_CLASS_ID, |bytes: &[u8]| -> Result<Box<dyn LeafData>> {
            let value = String::from_utf8(bytes.to_vec()).map_err(|err| TreeError::Decode {
                class_id: STRING_LEAF_CLASS_ID,
                reason: err.to_string(),
            })?;
            Ok(Box::new(StringLeaf::new(value)))
        })
        .expect("fresh registry");
    registry
        .register_internal(TEST_INTERNAL_CLASS_ID)
        .expect("fresh registry");
    registry
}

/// A fixture tree with its nodes addressable by name.
#[derive(Debug, Default)]
pub struct FixtureTree {
    pub root: Option<NodeRef>,
    names: Vec<(String, NodeRef)>,
}

impl FixtureTree {
    fn name(&mut self, name: &str, node: &NodeRef) {
        self.names.push((name.to_string(), node.clone()));
    }

    /// The node registered under `name`.
    ///
    /// # Panics
    ///
    /// Panics if no node has that name.
    pub fn node(&self, name: &str) -> NodeRef {
        self.names
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, node)| node.clone())
            .unwrap_or_else(|| panic!("no fixture node named {name}"))
    }

    /// Name of `node`, if it is one of the named nodes.
    pub fn name_of(&self, node: &NodeRef) -> Option<&str> {
        self.names
            .iter()
            .find(|(_, candidate)| candidate == node)
            .map(|(name, _)| name.as_str())
    }

    /// Readable label for an iterator position: the node's name, `?` for an
    /// unnamed node, or `null` followed by the route for an empty slot.
    pub fn label(&self, visit: &Visit) -> String {
        match &visit.node {
            Some(node) => self.name_of(node).unwrap_or("?").to_string(),
            None => format!("null{}", visit.route),
        }
    }
}

fn attach(parent: &NodeRef, index: usize, child: Option<&NodeRef>) {
    parent
        .set_child(index, child.cloned())
        .expect("fixture nodes are fresh and mutable");
}

/// No root at all.
pub fn build_size_zero_tree() -> FixtureTree {
    FixtureTree::default()
}

/// A lone leaf.
pub fn build_size_one_tree() -> FixtureTree {
    let mut tree = FixtureTree::default();
    let root = leaf("A");
    tree.name("root", &root);
    tree.root = Some(root);
    tree
}

/// ```text
/// root
/// ├── A
/// └── i0
///     ├── B
///     └── C
/// ```
pub fn build_simple_tree() -> FixtureTree {
    let mut tree = FixtureTree::default();
    let root = internal();
    let a = leaf("A");
    let i0 = internal();
    let b = leaf("B");
    let c = leaf("C");

    attach(&root, 0, Some(&a));
    attach(&root, 1, Some(&i0));
    attach(&i0, 0, Some(&b));
    attach(&i0, 1, Some(&c));

    for (name, node) in [("root", &root), ("A", &a), ("i0", &i0), ("B", &b), ("C", &c)] {
        tree.name(name, node);
    }
    tree.root = Some(root);
    tree
}

/// ```text
/// root
/// ├── A
/// ├── i0
/// │   ├── B
/// │   └── C
/// └── i1
///     ├── D
///     └── (empty)
/// ```
pub fn build_less_simple_tree() -> FixtureTree {
    let mut tree = build_simple_tree();
    let root = tree.node("root");
    let i1 = internal();
    let d = leaf("D");

    attach(&root, 2, Some(&i1));
    attach(&i1, 0, Some(&d));
    attach(&i1, 1, None);

    tree.name("i1", &i1);
    tree.name("D", &d);
    tree
}

/// ```text
/// root
/// ├── A
/// ├── i0
/// │   ├── i4
/// │   └── C
/// └── i1
///     ├── D
///     └── i2
///         ├── i3
///         │   ├── F
///         │   └── G
///         └── E
/// ```
pub fn build_less_simple_tree_extended() -> FixtureTree {
    let mut tree = FixtureTree::default();
    let root = internal();
    let a = leaf("A");
    let i0 = internal();
    let i4 = internal();
    let c = leaf("C");
    let i1 = internal();
    let d = leaf("D");
    let i2 = internal();
    let i3 = internal();
    let e = leaf("E");
    let f = leaf("F");
    let g = leaf("G");

    attach(&i3, 0, Some(&f));
    attach(&i3, 1, Some(&g));
    attach(&i2, 0, Some(&i3));
    attach(&i2, 1, Some(&e));
    attach(&i1, 0, Some(&d));
    attach(&i1, 1, Some(&i2));
    attach(&i0, 0, Some(&i4));
    attach(&i0, 1, Some(&c));
    attach(&root, 0, Some(&a));
    attach(&root, 1, Some(&i0));
    attach(&root, 2, Some(&i1));

    for (name, node) in [
        ("root", &root),
        ("A", &a),
        ("i0", &i0),
        ("i4", &i4),
        ("C", &c),
        ("i1", &i1),
        ("D", &d),
        ("i2", &i2),
        ("i3", &i3),
        ("E", &e),
        ("F", &f),
        ("G", &g),
    ] {
        tree.name(name, node);
    }
    tree.root = Some(root);
    tree
}

/// Random tree with an internal root, at most `max_depth` levels below the
/// root and at most `max_children` slots per internal node. Some slots are
/// left empty. Nodes are named `n0`, `n1`, ... in creation order.
///
/// The same seed always yields the same shape and payloads.
pub fn generate_random_tree(seed: u64, max_depth: usize, max_children: usize) -> FixtureTree {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut tree = FixtureTree::default();
    let root = internal();
    tree.name("n0", &root);

    let mut pending = vec![(root.clone(), 0usize)];
    while let Some((parent, depth)) = pending.pop() {
        let slots = rng.gen_range(1..=max_children.max(1));
        for index in 0..slots {
            let child = if rng.gen_bool(0.1) {
                None
            } else if depth + 1 < max_depth && rng.gen_bool(0.4) {
                let node = internal();
                pending.push((node.clone(), depth + 1));
                Some(node)
            } else {
                Some(leaf(&format!("leaf-{}", tree.names.len())))
            };
            if let Some(node) = &child {
                let name = format!("n{}", tree.names.len());
                tree.name(&name, node);
            }
            attach(&parent, index, child.as_ref());
        }
    }

    tree.root = Some(root);
    tree
}
