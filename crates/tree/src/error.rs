//! Error types for tree operations.

use fastcopy_types::Route;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TreeError>;

/// Errors raised by the tree engine.
///
/// None of these are retried internally. Each one means the caller broke a
/// contract (used a destroyed node, mutated a frozen or shared node, or held
/// a stale route) and must correct its own state before trying again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    /// Reservation or mutation attempted on a node that has been destroyed.
    #[error("cannot {op} node at {route}: node has been destroyed")]
    Destroyed {
        /// Operation that was attempted.
        op: &'static str,
        /// Route the node last reported.
        route: Route,
    },

    /// Mutation attempted on a node that has been frozen.
    #[error("cannot {op} node at {route}: node is immutable")]
    Immutable {
        /// Operation that was attempted.
        op: &'static str,
        /// Route of the frozen node.
        route: Route,
    },

    /// In-place mutation attempted on a node referenced by more than one parent.
    #[error("cannot {op} node at {route}: node is shared ({reservations} reservations)")]
    Shared {
        /// Operation that was attempted.
        op: &'static str,
        /// Route the node reports.
        route: Route,
        /// Reservation count at the time of the check.
        reservations: i64,
    },

    /// Child access on a leaf.
    #[error("node at {route} is a leaf and has no children")]
    NotInternal {
        /// Route of the leaf.
        route: Route,
    },

    /// Payload access on an internal node.
    #[error("node at {route} is internal and has no payload")]
    NotLeaf {
        /// Route of the internal node.
        route: Route,
    },

    /// A route that does not lead to a node of the tree it was applied to.
    #[error("invalid route {route}: {reason}")]
    InvalidRoute {
        /// The offending route.
        route: Route,
        /// What went wrong while walking it.
        reason: String,
    },

    /// `levels_to_skip` must be smaller than the number of nodes on the path.
    #[error("cannot skip {levels} levels of a path with {path_len} nodes")]
    InvalidSkip {
        /// Requested number of levels to skip.
        levels: usize,
        /// Number of nodes on the path, path root included.
        path_len: usize,
    },

    /// A node on a replacement path does not report the route it sits at.
    #[error("node at {expected} reports route {actual}")]
    RouteMismatch {
        /// Position of the node in the tree.
        expected: Route,
        /// Route stored on the node.
        actual: Route,
    },

    /// An internal node was hashed before one of its children.
    #[error("child at {route} has no hash")]
    MissingHash {
        /// Route of the child with an empty hash cache.
        route: Route,
    },

    /// Reservation count would overflow.
    #[error("reservation count overflow for node at {route}")]
    Overflow {
        /// Route of the node.
        route: Route,
    },

    /// Iterator advanced past its last element.
    #[error("tree iteration exhausted")]
    Exhausted,

    /// No constructor registered for a class id.
    #[error("no constructor registered for class id {0:#x}")]
    UnknownClassId(u64),

    /// A constructor for this class id already exists.
    #[error("class id {0:#x} is already registered")]
    DuplicateClassId(u64),

    /// Class id registered for the other kind of node.
    #[error("class id {class_id:#x} does not construct a {expected} node")]
    WrongNodeKind {
        /// Requested class id.
        class_id: u64,
        /// Kind the caller asked for ("leaf" or "internal").
        expected: &'static str,
    },

    /// A leaf factory rejected its input bytes.
    #[error("failed to decode leaf of class {class_id:#x}: {reason}")]
    Decode {
        /// Class id being decoded.
        class_id: u64,
        /// Reason given by the factory.
        reason: String,
    },
}
