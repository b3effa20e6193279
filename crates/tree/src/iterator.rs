//! Tree traversal.
//!
//! [`TreeIterator`] walks one version of the tree in one of four orders and
//! yields a [`Visit`] per position: the node found there (or `None` for an
//! empty child slot) and the route at which it was found. Routes are computed
//! during the walk, so they are consistent for the version being walked even
//! when nodes are shared with other versions.
//!
//! Behaviour is configured builder style before the first element is pulled:
//!
//! - [`order`](TreeIterator::order): see [`IterationOrder`].
//! - [`ignore_null`](TreeIterator::ignore_null): skip empty slots (default) or
//!   yield them as `Visit { node: None, .. }`.
//! - [`filter`](TreeIterator::filter): decides whether a position is yielded.
//!   Rejected nodes are still descended into.
//! - [`descendant_filter`](TreeIterator::descendant_filter): decides whether a
//!   node's children are visited. A rejected node is still subject to the
//!   plain filter; only what is below it is pruned.
//! - [`transform`](TreeIterator::transform): maps each yielded position.
//!
//! The iterator assumes the tree does not change while it runs. Frozen
//! versions may be walked from any number of threads at once.

use crate::config::IteratorConfig;
use crate::error::{Result, TreeError};
use crate::node::NodeRef;
use fastcopy_types::Route;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Traversal order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationOrder {
    /// Level by level, left to right.
    BreadthFirst,
    /// Parent before children, children left to right.
    PreOrderedDepthFirst,
    /// Children before parent, children left to right.
    #[default]
    PostOrderedDepthFirst,
    /// Children before parent, children right to left.
    ReversePostOrderedDepthFirst,
}

/// A position yielded by [`TreeIterator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visit {
    /// Node at the position, `None` for an empty child slot.
    pub node: Option<NodeRef>,
    /// Route of the position within the version being walked.
    pub route: Route,
}

type Filter<'a> = Box<dyn Fn(Option<&NodeRef>, &Route) -> bool + Send + 'a>;
type DescendantFilter<'a> = Box<dyn Fn(&NodeRef, &Route) -> bool + Send + 'a>;

struct Frame {
    node: Option<NodeRef>,
    route: Route,
    expanded: bool,
}

/// Configurable traversal over a tree rooted at one node.
pub struct TreeIterator<'a> {
    root: Option<NodeRef>,
    order: IterationOrder,
    ignore_null: bool,
    filter: Option<Filter<'a>>,
    descendant_filter: Option<DescendantFilter<'a>>,
    frontier: VecDeque<Frame>,
    started: bool,
    peeked: Option<Visit>,
}

impl<'a> TreeIterator<'a> {
    /// Iterate the tree rooted at `root`, or nothing if `root` is `None`.
    pub fn new(root: Option<&NodeRef>) -> Self {
        Self::with_config(root, &IteratorConfig::default())
    }

    /// Iterate with order and null handling taken from `config`.
    pub fn with_config(root: Option<&NodeRef>, config: &IteratorConfig) -> Self {
        Self {
            root: root.cloned(),
            order: config.order,
            ignore_null: config.ignore_null,
            filter: None,
            descendant_filter: None,
            frontier: VecDeque::new(),
            started: false,
            peeked: None,
        }
    }

    pub fn order(mut self, order: IterationOrder) -> Self {
        self.order = order;
        self
    }

    pub fn ignore_null(mut self, ignore_null: bool) -> Self {
        self.ignore_null = ignore_null;
        self
    }

    /// Only yield positions for which `filter` returns true. Empty slots are
    /// passed as `None` when nulls are not ignored.
    pub fn filter(mut self, filter: impl Fn(Option<&NodeRef>, &Route) -> bool + Send + 'a) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Only visit the children of nodes for which `filter` returns true.
    pub fn descendant_filter(mut self, filter: impl Fn(&NodeRef, &Route) -> bool + Send + 'a) -> Self {
        self.descendant_filter = Some(Box::new(filter));
        self
    }

    /// Map every yielded position through `transform`.
    pub fn transform<T, F>(self, transform: F) -> Transformed<'a, F>
    where
        F: FnMut(Option<&NodeRef>, &Route) -> T,
    {
        Transformed {
            inner: self,
            transform,
        }
    }

    /// True if another position remains.
    pub fn has_next(&mut self) -> bool {
        if self.peeked.is_none() {
            self.peeked = self.advance();
        }
        self.peeked.is_some()
    }

    /// Next position, or [`TreeError::Exhausted`] once the walk is over.
    pub fn try_next(&mut self) -> Result<Visit> {
        self.next().ok_or(TreeError::Exhausted)
    }

    fn advance(&mut self) -> Option<Visit> {
        if !self.started {
            self.started = true;
            if let Some(root) = self.root.take() {
                let route = root.route();
                self.frontier.push_back(Frame {
                    node: Some(root),
                    route,
                    expanded: false,
                });
            }
        }

        loop {
            let frame = match self.order {
                IterationOrder::BreadthFirst => self.frontier.pop_front()?,
                _ => self.frontier.pop_back()?,
            };

            match self.order {
                IterationOrder::BreadthFirst | IterationOrder::PreOrderedDepthFirst => {
                    self.push_children(&frame);
                }
                IterationOrder::PostOrderedDepthFirst
                | IterationOrder::ReversePostOrderedDepthFirst => {
                    let children = if frame.expanded {
                        Vec::new()
                    } else {
                        self.children_of(&frame)
                    };
                    if !children.is_empty() {
                        self.frontier.push_back(Frame {
                            expanded: true,
                            ..frame
                        });
                        self.push_frames(children);
                        continue;
                    }
                }
            }

            if self.accepts(&frame) {
                return Some(Visit {
                    node: frame.node,
                    route: frame.route,
                });
            }
        }
    }

    fn accepts(&self, frame: &Frame) -> bool {
        self.filter
            .as_ref()
            .map_or(true, |filter| filter(frame.node.as_ref(), &frame.route))
    }

    fn expands(&self, node: &NodeRef, route: &Route) -> bool {
        node.is_internal()
            && self
                .descendant_filter
                .as_ref()
                .map_or(true, |filter| filter(node, route))
    }

    /// Child frames of `frame` left to right, empty if it is not expanded.
    fn children_of(&self, frame: &Frame) -> Vec<Frame> {
        let Some(node) = &frame.node else {
            return Vec::new();
        };
        if !self.expands(node, &frame.route) {
            return Vec::new();
        }
        let Ok(children) = node.children() else {
            return Vec::new();
        };
        children
            .into_iter()
            .enumerate()
            .filter(|(_, child)| child.is_some() || !self.ignore_null)
            .map(|(index, child)| Frame {
                node: child,
                route: frame.route.extend(index),
                expanded: false,
            })
            .collect()
    }

    fn push_children(&mut self, frame: &Frame) {
        let children = self.children_of(frame);
        self.push_frames(children);
    }

    /// Queue children so they come out in the order's sibling order.
    fn push_frames(&mut self, children: Vec<Frame>) {
        match self.order {
            IterationOrder::BreadthFirst | IterationOrder::ReversePostOrderedDepthFirst => {
                self.frontier.extend(children);
            }
            IterationOrder::PreOrderedDepthFirst | IterationOrder::PostOrderedDepthFirst => {
                self.frontier.extend(children.into_iter().rev());
            }
        }
    }
}

impl Iterator for TreeIterator<'_> {
    type Item = Visit;

    fn next(&mut self) -> Option<Visit> {
        self.peeked.take().or_else(|| self.advance())
    }
}

/// A [`TreeIterator`] whose positions are mapped through a function.
pub struct Transformed<'a, F> {
    inner: TreeIterator<'a>,
    transform: F,
}

impl<T, F> Transformed<'_, F>
where
    F: FnMut(Option<&NodeRef>, &Route) -> T,
{
    pub fn has_next(&mut self) -> bool {
        self.inner.has_next()
    }

    /// Next mapped position, or [`TreeError::Exhausted`] once the walk is over.
    pub fn try_next(&mut self) -> Result<T> {
        self.next().ok_or(TreeError::Exhausted)
    }
}

impl<T, F> Iterator for Transformed<'_, F>
where
    F: FnMut(Option<&NodeRef>, &Route) -> T,
{
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let visit = self.inner.next()?;
        Some((self.transform)(visit.node.as_ref(), &visit.route))
    }
}

impl NodeRef {
    /// Iterate the tree rooted at this node with default settings.
    pub fn tree_iter<'a>(&self) -> TreeIterator<'a> {
        TreeIterator::new(Some(self))
    }
}
