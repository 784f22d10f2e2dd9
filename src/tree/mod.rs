//! Build and manipulate rooted phylogenetic trees.
//!
//! This module defines the two essential structs used everywhere else in
//! the crate:
//!  - The [`Node`] struct that represents a node of a phylogenetic tree.
//!  - The [`Tree`] struct that holds a collection of [`Node`] objects in a
//!    flat arena, indexed by [`NodeId`].

mod node;
mod tree_impl;

pub use self::node::{Node, NodeError};
pub use self::tree_impl::{NewickParseError, Tree, TreeError};

/// A type that represents identifiers of [`Node`] objects
/// within a phylogenetic [`Tree`] object.
pub type NodeId = usize;

/// A type that represents branch lengths between [`Node`] objects
/// within a phylogenetic [`Tree`] object.
pub type EdgeLength = f64;
