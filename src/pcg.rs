//! Proper cluster graph over taxa.
//!
//! Two taxa are *properly clustered* in a source tree when they appear
//! together in a clade that excludes at least one other taxon of that tree,
//! i.e. in the clade below some internal non-root node. The proper cluster
//! graph (PCG) has one meta-vertex per taxon and a weighted edge for every
//! properly clustered taxon pair; it is the structure the supertree
//! recursion repeatedly partitions.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use clap::ValueEnum;
use itertools::Itertools;
use petgraph::unionfind::UnionFind;

use crate::tree::{Tree, TreeError};

/// How much weight an edge of the proper cluster graph accumulates each
/// time its two taxa are observed in a proper cluster.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Weighting {
    /// The weight of the source tree.
    One,
    /// The tree weight scaled by the length of the branch separating the
    /// cluster from the rest of the tree (missing lengths count as 1).
    Branch,
    /// The tree weight scaled by the inverse depth of the cluster root.
    Depth,
}

/// A weighted graph over taxa recording how often, and how strongly, each
/// pair of taxa is properly clustered across the input trees.
///
/// Vertices are *meta-vertices*: sets of taxa that started out as
/// singletons and may be merged by [`contract`](ProperClusterGraph::contract).
#[derive(Debug, Clone)]
pub struct ProperClusterGraph {
    /// Taxa absorbed into each meta-vertex
    vertices: Vec<Vec<String>>,
    /// Edge weights, keyed by vertex index pairs with the smaller index first
    edges: HashMap<(usize, usize), f64>,
    /// Number of input trees containing each taxon
    occurrences: Vec<usize>,
    /// Number of input trees in which a pair co-occurs in a proper cluster
    co_occurrences: HashMap<(usize, usize), usize>,
}

impl ProperClusterGraph {
    fn key(a: usize, b: usize) -> (usize, usize) {
        if a < b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Builds the proper cluster graph for a weighted set of trees.
    ///
    /// For every internal non-root node of every tree, every unordered pair
    /// of taxa in its clade accumulates an edge weight contribution under
    /// the selected [`Weighting`]. Occurrence and co-occurrence counters are
    /// filled along the way for [`contract`](ProperClusterGraph::contract).
    pub fn build(trees: &[Tree], weights: &[f64], weighting: Weighting) -> Result<Self, TreeError> {
        // Sort taxa so vertex numbering does not depend on input order
        let mut all_names = BTreeSet::new();
        for tree in trees {
            all_names.extend(tree.tip_names());
        }

        let vertices: Vec<Vec<String>> = all_names.iter().map(|name| vec![name.clone()]).collect();
        let index: HashMap<String, usize> = all_names.iter().cloned().zip(0..).collect();

        let mut edges: HashMap<(usize, usize), f64> = HashMap::new();
        let mut occurrences = vec![0; vertices.len()];
        let mut co_occurrences: HashMap<(usize, usize), usize> = HashMap::new();

        for (tree, &weight) in trees.iter().zip(weights.iter()) {
            let root = tree.get_root()?;

            // Vertex indices of the tips below every node of this tree
            let mut below: HashMap<usize, Vec<usize>> = HashMap::new();
            for id in tree.postorder(&root)? {
                let node = tree.get(&id)?;
                let tips = if node.is_tip() {
                    match &node.name {
                        Some(name) => vec![index[name]],
                        None => vec![],
                    }
                } else {
                    node.children
                        .iter()
                        .flat_map(|child| below[child].iter().copied())
                        .collect()
                };
                below.insert(id, tips);
            }

            for &tip in below[&root].iter() {
                occurrences[tip] += 1;
            }

            // The clade of each internal non-root node is a proper cluster
            for id in tree.internal_nodes()? {
                let node = tree.get(&id)?;
                let contribution = match weighting {
                    Weighting::One => weight,
                    Weighting::Branch => weight * node.parent_edge.unwrap_or(1.0),
                    Weighting::Depth => weight / node.get_depth() as f64,
                };

                for (&a, &b) in below[&id].iter().tuple_combinations() {
                    *edges.entry(Self::key(a, b)).or_insert(0.0) += contribution;
                }
            }

            // Two taxa of this tree share a proper cluster exactly when they
            // sit under the same child of the root; count each pair once
            for child in tree.get(&root)?.children.iter() {
                for (&a, &b) in below[child].iter().tuple_combinations() {
                    *co_occurrences.entry(Self::key(a, b)).or_insert(0) += 1;
                }
            }
        }

        Ok(Self {
            vertices,
            edges,
            occurrences,
            co_occurrences,
        })
    }

    /// Builds a graph directly from vertices and edge weights, bypassing
    /// the tree scan. Counters are left empty so `contract` is a no-op.
    #[cfg(test)]
    pub(crate) fn from_parts(vertices: Vec<Vec<String>>, edges: HashMap<(usize, usize), f64>) -> Self {
        let n = vertices.len();
        Self {
            vertices,
            edges,
            occurrences: vec![0; n],
            co_occurrences: HashMap::new(),
        }
    }

    /// Number of meta-vertices in the graph
    pub fn n_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// The taxa absorbed into a meta-vertex
    pub fn taxa(&self, vertex: usize) -> &[String] {
        &self.vertices[vertex]
    }

    /// All taxa of a group of meta-vertices
    pub fn group_taxa(&self, group: &[usize]) -> BTreeSet<String> {
        group
            .iter()
            .flat_map(|&v| self.vertices[v].iter().cloned())
            .collect()
    }

    /// The edge weight map, keyed by vertex index pairs (smaller index first)
    pub fn edges(&self) -> &HashMap<(usize, usize), f64> {
        &self.edges
    }

    /// Connected components of the graph, as groups of vertex indices.
    /// Ordering is deterministic for a given vertex numbering.
    pub fn components(&self) -> Vec<Vec<usize>> {
        let mut uf = UnionFind::<usize>::new(self.vertices.len());
        for &(u, v) in self.edges.keys() {
            uf.union(u, v);
        }

        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for v in 0..self.vertices.len() {
            groups.entry(uf.find(v)).or_default().push(v);
        }

        groups.into_values().collect()
    }

    /// Merges every pair of meta-vertices whose co-occurrence count equals
    /// both vertices' occurrence counts: such a pair is never properly
    /// separated by any input tree and must end up on the same side of every
    /// valid partition, so collapsing it loses no information.
    ///
    /// Edge weights between merged groups are summed, edges internal to a
    /// group disappear. The occurrence counters only describe the original
    /// singleton vertices and are dropped.
    pub fn contract(&mut self) {
        let n = self.vertices.len();
        let mut uf = UnionFind::<usize>::new(n);

        for (&(u, v), &count) in self.co_occurrences.iter() {
            if count == self.occurrences[u] && count == self.occurrences[v] {
                uf.union(u, v);
            }
        }

        let mut remap: HashMap<usize, usize> = HashMap::new();
        let mut vertices: Vec<Vec<String>> = Vec::new();
        for v in 0..n {
            let root = uf.find(v);
            let idx = match remap.get(&root) {
                Some(&idx) => idx,
                None => {
                    vertices.push(Vec::new());
                    remap.insert(root, vertices.len() - 1);
                    vertices.len() - 1
                }
            };
            vertices[idx].append(&mut self.vertices[v]);
        }

        let mut edges: HashMap<(usize, usize), f64> = HashMap::new();
        for (&(u, v), &weight) in self.edges.iter() {
            let (nu, nv) = (remap[&uf.find(u)], remap[&uf.find(v)]);
            if nu != nv {
                *edges.entry(Self::key(nu, nv)).or_insert(0.0) += weight;
            }
        }

        self.vertices = vertices;
        self.edges = edges;
        self.occurrences.clear();
        self.co_occurrences.clear();
    }
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

    fn vertex_of(pcg: &ProperClusterGraph, name: &str) -> usize {
        (0..pcg.n_vertices())
            .find(|&v| pcg.taxa(v).contains(&name.to_string()))
            .unwrap()
    }

    fn weight_between(pcg: &ProperClusterGraph, a: &str, b: &str) -> Option<f64> {
        let key = ProperClusterGraph::key(vertex_of(pcg, a), vertex_of(pcg, b));
        pcg.edges().get(&key).copied()
    }

    #[test]
    fn shared_cluster_makes_single_edge() {
        let trees = trees(&["(a,(b,c));", "(d,(b,c));"]);
        let pcg = ProperClusterGraph::build(&trees, &[1.0, 1.0], Weighting::One).unwrap();

        assert_eq!(pcg.n_vertices(), 4);
        assert_eq!(pcg.edges().len(), 1);
        assert_eq!(weight_between(&pcg, "b", "c"), Some(2.0));

        // a, d, and {b,c} fall apart into three components
        assert_eq!(pcg.components().len(), 3);
    }

    #[test]
    fn conflicting_quartets_make_complete_graph() {
        let trees = trees(&["((a,b),(c,d));", "((b,c),(a,d));", "((a,c),(b,d));"]);
        let pcg = ProperClusterGraph::build(&trees, &[1.0; 3], Weighting::One).unwrap();

        // every pair is properly clustered in exactly one tree
        assert_eq!(pcg.edges().len(), 6);
        for (a, b) in ["a", "b", "c", "d"]
            .iter()
            .tuple_combinations()
            .map(|(x, y)| (*x, *y))
        {
            assert_eq!(weight_between(&pcg, a, b), Some(1.0));
        }
        assert_eq!(pcg.components().len(), 1);
    }

    #[test]
    fn branch_weighting_scales_by_separating_edge() {
        let trees = trees(&["((a:1,b:1):2,c:1);"]);
        let pcg = ProperClusterGraph::build(&trees, &[1.0], Weighting::Branch).unwrap();

        assert_eq!(weight_between(&pcg, "a", "b"), Some(2.0));
    }

    #[test]
    fn depth_weighting_scales_by_inverse_depth() {
        let trees = trees(&["(((a,b),c),d);"]);
        let pcg = ProperClusterGraph::build(&trees, &[1.0], Weighting::Depth).unwrap();

        // (a,b) sits at depth 2, ((a,b),c) at depth 1
        assert_eq!(weight_between(&pcg, "a", "b"), Some(1.0 / 2.0 + 1.0));
        assert_eq!(weight_between(&pcg, "a", "c"), Some(1.0));
        assert_eq!(weight_between(&pcg, "b", "c"), Some(1.0));
    }

    #[test]
    fn tree_weights_scale_contributions() {
        let trees = trees(&["(a,(b,c));", "(d,(b,c));"]);
        let pcg = ProperClusterGraph::build(&trees, &[1.0, 0.25], Weighting::One).unwrap();

        assert_eq!(weight_between(&pcg, "b", "c"), Some(1.25));
    }

    #[test]
    fn contraction_merges_never_separated_pairs() {
        // both trees contain a and b, and both keep them clustered
        let trees = trees(&["((a,b),c);", "((a,b),d);"]);
        let mut pcg = ProperClusterGraph::build(&trees, &[1.0, 1.0], Weighting::One).unwrap();

        assert_eq!(pcg.n_vertices(), 4);
        pcg.contract();
        assert_eq!(pcg.n_vertices(), 3);

        let merged = vertex_of(&pcg, "a");
        assert_eq!(merged, vertex_of(&pcg, "b"));
        let mut taxa = pcg.taxa(merged).to_vec();
        taxa.sort();
        assert_eq!(taxa, vec!["a", "b"]);

        // the intra-group edge disappears
        assert!(pcg.edges().is_empty());
    }

    #[test]
    fn contraction_keeps_sometimes_separated_pairs() {
        // the second tree properly separates a from b
        let trees = trees(&["((a,b),c);", "((a,c),b,(d,e));"]);
        let mut pcg = ProperClusterGraph::build(&trees, &[1.0, 1.0], Weighting::One).unwrap();

        pcg.contract();
        assert_ne!(vertex_of(&pcg, "a"), vertex_of(&pcg, "b"));
    }
}
