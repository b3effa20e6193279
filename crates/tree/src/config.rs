//! Tree engine configuration.

use crate::iterator::IterationOrder;
use serde::{Deserialize, Serialize};

/// Defaults applied to iterators built with [`TreeIterator::with_config`].
///
/// [`TreeIterator::with_config`]: crate::TreeIterator::with_config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IteratorConfig {
    /// Traversal order.
    pub order: IterationOrder,

    /// Skip empty child slots instead of yielding them.
    pub ignore_null: bool,
}

impl Default for IteratorConfig {
    fn default() -> Self {
        Self {
            order: IterationOrder::PostOrderedDepthFirst,
            ignore_null: true,
        }
    }
}

impl IteratorConfig {
    /// Create a config with a custom traversal order.
    pub fn with_order(order: IterationOrder) -> Self {
        Self {
            order,
            ..Default::default()
        }
    }
}

/// Behaviour of [`replace_path_with`](crate::replace_path_with).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplacementConfig {
    /// Before splicing, check that every node kept in place reports the
    /// route it sits at.
    ///
    /// Costs one extra pass over the path; enabled by default in debug builds.
    pub verify_routes: bool,
}

impl Default for ReplacementConfig {
    fn default() -> Self {
        Self {
            verify_routes: cfg!(debug_assertions),
        }
    }
}

impl ReplacementConfig {
    /// Config that always verifies routes, regardless of build profile.
    pub fn verified() -> Self {
        Self {
            verify_routes: true,
        }
    }
}

/// Top-level configuration, as loaded by the embedding node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Iterator defaults.
    pub iterator: IteratorConfig,

    /// Path replacement behaviour.
    pub replacement: ReplacementConfig,
}
