//! Value types shared across the fast-copy merkle tree crates.
//!
//! - [`Hash`]: a 32-byte merkle digest
//! - [`Route`]: the address of a node within a tree

mod hash;
mod route;

pub use hash::Hash;
pub use route::{build_route, Route};
