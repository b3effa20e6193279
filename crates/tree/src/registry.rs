//! Class-id registry for rebuilding nodes.
//!
//! Deserializers read a class id and bytes (for leaves) or a class id and a
//! list of already-rebuilt children (for internal nodes), and need to turn
//! them back into nodes. The registry maps each class id to its constructor.
//! It is built once at start-up and passed by reference; there is no global
//! instance.

use crate::error::{Result, TreeError};
use crate::node::{LeafData, NodeRef};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Rebuilds a leaf payload from its canonical bytes.
pub type LeafFactory = Arc<dyn Fn(&[u8]) -> Result<Box<dyn LeafData>> + Send + Sync>;

#[derive(Clone)]
enum Constructor {
    Leaf(LeafFactory),
    Internal,
}

/// Table of node constructors keyed by class id.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    constructors: HashMap<u64, Constructor>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a leaf class. Fails if `class_id` is taken.
    pub fn register_leaf<F>(&mut self, class_id: u64, factory: F) -> Result<()>
    where
        F: Fn(&[u8]) -> Result<Box<dyn LeafData>> + Send + Sync + 'static,
    {
        self.insert(class_id, Constructor::Leaf(Arc::new(factory)))
    }

    /// Register an internal node class. Fails if `class_id` is taken.
    pub fn register_internal(&mut self, class_id: u64) -> Result<()> {
        self.insert(class_id, Constructor::Internal)
    }

    fn insert(&mut self, class_id: u64, constructor: Constructor) -> Result<()> {
        if self.constructors.contains_key(&class_id) {
            return Err(TreeError::DuplicateClassId(class_id));
        }
        let kind = match constructor {
            Constructor::Leaf(_) => "leaf",
            Constructor::Internal => "internal",
        };
        self.constructors.insert(class_id, constructor);
        debug!(class_id, kind, "registered node class");
        Ok(())
    }

    pub fn is_registered(&self, class_id: u64) -> bool {
        self.constructors.contains_key(&class_id)
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    fn lookup(&self, class_id: u64) -> Result<&Constructor> {
        self.constructors
            .get(&class_id)
            .ok_or(TreeError::UnknownClassId(class_id))
    }

    /// Rebuild a detached leaf from `bytes`.
    pub fn construct_leaf(&self, class_id: u64, bytes: &[u8]) -> Result<NodeRef> {
        match self.lookup(class_id)? {
            Constructor::Leaf(factory) => Ok(NodeRef::leaf_boxed(factory(bytes)?)),
            Constructor::Internal => Err(TreeError::WrongNodeKind {
                class_id,
                expected: "leaf",
            }),
        }
    }

    /// Rebuild a detached internal node with `children` attached in order.
    pub fn construct_internal(
        &self,
        class_id: u64,
        children: impl IntoIterator<Item = Option<NodeRef>>,
    ) -> Result<NodeRef> {
        match self.lookup(class_id)? {
            Constructor::Internal => NodeRef::internal_with(class_id, children),
            Constructor::Leaf(_) => Err(TreeError::WrongNodeKind {
                class_id,
                expected: "internal",
            }),
        }
    }
}

impl fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.constructors.keys().copied().collect();
        ids.sort_unstable();
        f.debug_struct("NodeRegistry")
            .field("class_ids", &ids)
            .finish()
    }
}
