//! Supertree assembly by recursive partitioning of the proper cluster graph.
//!
//! The assembler follows the min-cut supertree scheme of Semple & Steel:
//! build the proper cluster graph over all taxa, split it along its
//! connected components (partitioning it first when it is connected),
//! induce the input trees on each part, recurse, and join the resulting
//! subtrees under a fresh root.

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, warn};

use crate::partition::Partitioner;
use crate::pcg::{ProperClusterGraph, Weighting};
use crate::tree::{Node, Tree, TreeError};

/// Knobs of the supertree assembly.
#[derive(Debug, Copy, Clone)]
pub struct SupertreeConfig {
    /// Weighting of the proper cluster graph edges
    pub weighting: Weighting,
    /// Whether to contract never-separated taxon pairs before partitioning
    pub contract_edges: bool,
    /// Strategy used to split a connected proper cluster graph
    pub partitioner: Partitioner,
}

impl Default for SupertreeConfig {
    fn default() -> Self {
        Self {
            weighting: Weighting::One,
            contract_edges: true,
            partitioner: Partitioner::MinCut,
        }
    }
}

/// Builds a supertree over the union of the input trees' taxa.
///
/// Every input tree must have uniquely named tips. When `weights` is given
/// it must hold one positive weight per tree; otherwise all trees weigh 1.
///
/// # Panics
/// Panics when `trees` is empty or when `weights` has a different length
/// than `trees`.
pub fn build_supertree(
    trees: &[Tree],
    weights: Option<&[f64]>,
    config: SupertreeConfig,
) -> Result<Tree, TreeError> {
    assert!(!trees.is_empty(), "there must be at least one input tree");
    if let Some(weights) = weights {
        assert_eq!(
            trees.len(),
            weights.len(),
            "trees and weights must be of the same length"
        );
    }

    for tree in trees {
        if !tree.has_unique_tip_names()? {
            return Err(TreeError::DuplicateLeafNames);
        }
    }

    let weights = match weights {
        Some(weights) => weights.to_vec(),
        None => vec![1.0; trees.len()],
    };

    let mut supertree = assemble(trees, &weights, &config)?;
    supertree.reset_depths()?;

    Ok(supertree)
}

fn assemble(trees: &[Tree], weights: &[f64], config: &SupertreeConfig) -> Result<Tree, TreeError> {
    // A single remaining tree is the supertree of itself
    if trees.len() == 1 {
        let mut tree = trees[0].clone();
        tree.strip_internal_names();
        return Ok(tree);
    }

    let mut all_names: BTreeSet<String> = BTreeSet::new();
    for tree in trees {
        all_names.extend(tree.tip_names());
    }

    if all_names.len() <= 2 {
        return tip_names_to_tree(all_names.iter());
    }

    debug!(
        taxa = all_names.len(),
        trees = trees.len(),
        "assembling supertree"
    );

    let mut pcg = ProperClusterGraph::build(trees, weights, config.weighting)?;
    let mut groups = pcg.components();

    if groups.len() == 1 {
        if config.contract_edges {
            pcg.contract();
        }
        groups = config.partitioner.partition(&pcg);

        if groups.len() < 2 {
            // Nothing separates these taxa, so no resolution is supported
            warn!(
                taxa = all_names.len(),
                "proper cluster graph could not be split, returning a polytomy"
            );
            return tip_names_to_tree(all_names.iter());
        }
    }

    let mut subtrees: Vec<Tree> = Vec::new();

    for group in groups {
        let taxa = pcg.group_taxa(&group);

        if taxa.len() <= 2 {
            subtrees.push(tip_names_to_tree(taxa.iter())?);
            continue;
        }

        // Inducing can drop trees entirely, and single-tip inductions
        // carry no clustering information
        let taxa_set: HashSet<String> = taxa.iter().cloned().collect();
        let mut induced_trees = Vec::new();
        let mut induced_weights = Vec::new();
        for (tree, &weight) in trees.iter().zip(weights.iter()) {
            if let Some(induced) = tree.induced(&taxa_set)? {
                if induced.n_leaves() >= 2 {
                    induced_trees.push(induced);
                    induced_weights.push(weight);
                }
            }
        }

        if induced_trees.is_empty() {
            subtrees.push(tip_names_to_tree(taxa.iter())?);
            continue;
        }

        let mut covered: HashSet<String> = HashSet::new();
        for tree in induced_trees.iter() {
            covered.extend(tree.tip_names());
        }

        subtrees.push(assemble(&induced_trees, &induced_weights, config)?);

        // Taxa dropped by every induction come back as singleton subtrees
        for name in taxa.iter().filter(|name| !covered.contains(*name)) {
            subtrees.push(tip_names_to_tree(std::iter::once(name))?);
        }
    }

    connect_trees(subtrees)
}

/// A tree directly expressing a set of taxa: a single tip for one name, a
/// star over the names otherwise.
fn tip_names_to_tree<'a>(
    names: impl IntoIterator<Item = &'a String>,
) -> Result<Tree, TreeError> {
    let names: Vec<&String> = names.into_iter().collect();
    let mut tree = Tree::new();

    if names.len() == 1 {
        tree.add(Node::new_named(names[0]));
    } else {
        let root = tree.add(Node::new());
        for name in names {
            tree.add_child(Node::new_named(name), root, None)?;
        }
    }

    Ok(tree)
}

/// Joins the given trees under a fresh common root.
fn connect_trees(mut subtrees: Vec<Tree>) -> Result<Tree, TreeError> {
    if subtrees.len() == 1 {
        return Ok(subtrees.swap_remove(0));
    }

    let mut tree = Tree::new();
    let root = tree.add(Node::new());
    for subtree in subtrees.iter() {
        tree.graft(root, subtree, &subtree.get_root()?)?;
    }

    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trees(newicks: &[&str]) -> Vec<Tree> {
        newicks
            .iter()
            .map(|nwk| Tree::from_newick(nwk).unwrap())
            .collect()
    }

    fn build(newicks: &[&str]) -> Tree {
        build_supertree(&trees(newicks), None, SupertreeConfig::default()).unwrap()
    }

    /// Tip name sets of all internal non-root nodes, i.e. the non-trivial
    /// clades of the tree.
    fn clades(tree: &Tree) -> Vec<BTreeSet<String>> {
        tree.internal_nodes()
            .unwrap()
            .into_iter()
            .map(|id| {
                tree.subtree_tip_names(&id)
                    .unwrap()
                    .into_iter()
                    .collect::<BTreeSet<String>>()
            })
            .collect()
    }

    fn names(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn contains_every_input_taxon() {
        let supertree = build(&["((a,b),c);", "((b,d),e);"]);

        let mut tips: Vec<_> = supertree.tip_names().into_iter().collect();
        tips.sort();
        assert_eq!(tips, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn single_tree_is_returned_as_is() {
        let supertree = build(&["((A,B)X,C)Y;"]);
        // internal labels are dropped, the topology is untouched
        assert_eq!(supertree.to_newick().unwrap(), "((A,B),C);");
    }

    #[test]
    fn two_taxa_make_a_cherry() {
        let supertree = build(&["(a,b);", "(b,a);"]);
        assert_eq!(supertree.to_newick().unwrap(), "(a,b);");
    }

    #[test]
    fn shared_cluster_survives() {
        // both trees agree that b and c belong together
        let supertree = build(&["(a,(b,c));", "(d,(b,c));"]);

        assert_eq!(supertree.to_newick().unwrap(), "(a,(b,c),d);");
    }

    #[test]
    fn conflicting_quartets_collapse_into_polytomy() {
        // the three possible resolutions of the same quartet cancel out
        let supertree = build(&["((a,b),(c,d));", "((b,c),(a,d));", "((a,c),(b,d));"]);

        assert_eq!(supertree.to_newick().unwrap(), "(a,b,c,d);");
    }

    #[test]
    fn compatible_trees_keep_their_clades() {
        let supertree = build(&["((a,b),c);", "((a,b),d);"]);

        assert_eq!(supertree.to_newick().unwrap(), "((a,b),c,d);");
    }

    #[test]
    fn conflict_within_a_component_stays_unresolved() {
        // both trees place a with b, but disagree on d and e below c
        let supertree = build(&["((a,b),(c,d));", "((a,b),(c,e));"]);

        assert_eq!(supertree.to_newick().unwrap(), "((a,b),(c,d,e));");
    }

    #[test]
    fn induction_recovers_compatible_inputs() {
        let supertree = build(&["((a,b),c);", "((a,b),d);"]);

        let taxa: HashSet<String> = names(&["a", "b", "c"]).into_iter().collect();
        let induced = supertree.induced(&taxa).unwrap().unwrap();
        assert!(clades(&induced).contains(&names(&["a", "b"])));
    }

    #[test]
    fn assembler_is_idempotent_on_induced_output() {
        let supertree = build(&["((a,b),c);", "((b,d),e);"]);

        let taxa: HashSet<String> = names(&["a", "b", "d"]).into_iter().collect();
        let induced = supertree.induced(&taxa).unwrap().unwrap();
        let rebuilt =
            build_supertree(&[induced.clone()], None, SupertreeConfig::default()).unwrap();

        assert_eq!(rebuilt.to_newick().unwrap(), induced.to_newick().unwrap());
    }

    #[test]
    fn spectral_partitioner_keeps_all_taxa() {
        let config = SupertreeConfig {
            partitioner: Partitioner::Spectral,
            ..SupertreeConfig::default()
        };
        let inputs = trees(&["((a,b),(c,d));", "((b,c),(a,d));", "((a,c),(b,d));"]);
        let supertree = build_supertree(&inputs, None, config).unwrap();

        assert_eq!(supertree.tip_names(), names(&["a", "b", "c", "d"]).into_iter().collect());
    }

    #[test]
    fn weights_break_ties() {
        // the heavier second tree should win the placement of c
        let inputs = trees(&["((a,b),(c,d));", "((a,c),(b,d));"]);
        let supertree =
            build_supertree(&inputs, Some(&[1.0, 10.0]), SupertreeConfig::default()).unwrap();

        assert!(clades(&supertree).contains(&names(&["a", "c"])));
    }

    #[test]
    fn duplicate_tip_names_are_rejected() {
        let inputs = trees(&["((a,a),b);", "((a,b),c);"]);
        let result = build_supertree(&inputs, None, SupertreeConfig::default());

        assert!(matches!(result, Err(TreeError::DuplicateLeafNames)));
    }

    #[test]
    #[should_panic(expected = "at least one input tree")]
    fn empty_input_panics() {
        let _ = build_supertree(&[], None, SupertreeConfig::default());
    }

    #[test]
    #[should_panic(expected = "same length")]
    fn mismatched_weights_panic() {
        let inputs = trees(&["((a,b),c);"]);
        let _ = build_supertree(&inputs, Some(&[1.0, 2.0]), SupertreeConfig::default());
    }
}
