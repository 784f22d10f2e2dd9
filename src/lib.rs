//! Build supertrees from overlapping phylogenetic trees, and decompose
//! large trees into overlapping subproblems.
//!
//! The two entry points are [`build_supertree`], a min-cut supertree
//! assembler working on the proper cluster graph of the input trees, and
//! [`decompose`], a DCM3-style decomposition splitting a guide tree along
//! its short subtree graph.

use std::collections::VecDeque;

use rand::prelude::*;

use tree::{Node, Tree, TreeError};

pub mod decompose;
pub mod partition;
pub mod pcg;
pub mod supertree;
pub mod tree;

pub use crate::decompose::{decompose, split_tree};
pub use crate::partition::Partitioner;
pub use crate::pcg::Weighting;
pub use crate::supertree::{build_supertree, SupertreeConfig};

/// Generates a random binary tree of a given size. Branch lengths are
/// uniformly distributed.
///
/// # Panics
/// Panics when `n_leaves` is zero.
pub fn generate_tree(n_leaves: usize, brlens: bool) -> Result<Tree, TreeError> {
    assert!(n_leaves > 0, "cannot generate an empty tree");

    let mut tree = Tree::new();
    let mut rng = thread_rng();

    let mut next_deq = VecDeque::new();
    next_deq.push_back(tree.add(Node::new()));

    for _ in 0..(n_leaves - 1) {
        let parent_id = if rng.gen_bool(0.5) {
            next_deq.pop_front()
        } else {
            next_deq.pop_back()
        }
        .ok_or(TreeError::IsEmpty)?;

        let l1: Option<f64> = if brlens { Some(rng.gen()) } else { None };
        let l2: Option<f64> = if brlens { Some(rng.gen()) } else { None };

        next_deq.push_back(tree.add_child(Node::new(), parent_id, l1)?);
        next_deq.push_back(tree.add_child(Node::new(), parent_id, l2)?);
    }

    for (i, id) in next_deq.iter().enumerate() {
        tree.get_mut(id)?.set_name(format!("Tip_{i}"));
    }

    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tree_has_requested_tips() {
        let tree = generate_tree(20, false).unwrap();
        assert_eq!(tree.n_leaves(), 20);
        assert!(tree.has_unique_tip_names().unwrap());
    }

    #[test]
    fn generated_tree_brlens() {
        let tree = generate_tree(10, true).unwrap();
        for id in tree.get_leaves() {
            assert!(tree.get(&id).unwrap().parent_edge.is_some());
        }
    }
}
