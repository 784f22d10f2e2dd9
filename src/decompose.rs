//! Disk-covering decomposition of a guide tree (DCM3).
//!
//! Every internal edge of the guide tree defines a *short subtree*: the
//! closest tips, by path length, on each of the four sides of the edge.
//! The short subtree graph connects taxa appearing in a common short
//! subtree; removing a separator from it splits the taxa into overlapping
//! subproblems that each induce a subtree of the guide tree. Subproblems
//! larger than the requested maximum are decomposed again.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap, HashSet};

use itertools::Itertools;
use petgraph::unionfind::UnionFind;
use tracing::{debug, warn};

use crate::tree::{NodeError, NodeId, Tree, TreeError};

/// Frontier entry of a uniform-cost search over the guide tree. Ties on
/// distance are broken by node id so traversal order is deterministic.
struct Visit {
    distance: f64,
    node: NodeId,
    /// Neighbour we arrived from, never revisited
    banned: Option<NodeId>,
}

impl PartialEq for Visit {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Visit {}

impl PartialOrd for Visit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Visit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.node.cmp(&other.node))
    }
}

/// The set of tips below `start` closest to it by path length, including
/// ties. Missing branch lengths count as 1.
fn ucs_descending(tree: &Tree, start: NodeId) -> Result<BTreeSet<String>, TreeError> {
    let mut frontier = BinaryHeap::new();
    frontier.push(Reverse(Visit {
        distance: 0.0,
        node: start,
        banned: None,
    }));

    let mut closest = BTreeSet::new();
    let mut shortest = f64::INFINITY;

    while let Some(Reverse(visit)) = frontier.pop() {
        if visit.distance > shortest {
            break;
        }

        let node = tree.get(&visit.node)?;
        if node.is_tip() {
            if let Some(name) = &node.name {
                closest.insert(name.clone());
            }
            shortest = visit.distance;
        } else {
            for &child in node.children.iter() {
                let edge = tree.get(&child)?.parent_edge.unwrap_or(1.0);
                frontier.push(Reverse(Visit {
                    distance: visit.distance + edge,
                    node: child,
                    banned: None,
                }));
            }
        }
    }

    Ok(closest)
}

/// The closest tips reachable from `start` through its grandparent,
/// i.e. on the rootward side of the edge above `start`'s parent.
///
/// Unlike the descending search this one walks the tree as if it were
/// unrooted, so every step records the neighbour it came from.
fn ucs_ascending(tree: &Tree, start: NodeId) -> Result<BTreeSet<String>, TreeError> {
    let parent = tree.get(&start)?.parent.ok_or(NodeError::HasNoParent(start))?;
    let grandparent = tree
        .get(&parent)?
        .parent
        .ok_or(NodeError::HasNoParent(parent))?;

    let mut frontier = BinaryHeap::new();
    frontier.push(Reverse(Visit {
        distance: 0.0,
        node: grandparent,
        banned: Some(parent),
    }));

    let mut closest = BTreeSet::new();
    let mut shortest = f64::INFINITY;

    while let Some(Reverse(visit)) = frontier.pop() {
        if visit.distance > shortest {
            break;
        }

        let node = tree.get(&visit.node)?;
        if node.is_tip() {
            if let Some(name) = &node.name {
                closest.insert(name.clone());
            }
            shortest = visit.distance;
            continue;
        }

        for &child in node.children.iter() {
            if Some(child) == visit.banned {
                continue;
            }
            let edge = tree.get(&child)?.parent_edge.unwrap_or(1.0);
            frontier.push(Reverse(Visit {
                distance: visit.distance + edge,
                node: child,
                banned: Some(visit.node),
            }));
        }

        if let Some(up) = node.parent {
            if Some(up) != visit.banned {
                frontier.push(Reverse(Visit {
                    distance: visit.distance + node.parent_edge.unwrap_or(1.0),
                    node: up,
                    banned: Some(visit.node),
                }));
            }
        }
    }

    Ok(closest)
}

/// The short subtree around the edge between `internal` and its parent:
/// the closest tips below each of `internal`'s children, plus the closest
/// tips on the two sides above the edge.
fn compute_short_subtree(tree: &Tree, internal: NodeId) -> Result<BTreeSet<String>, TreeError> {
    let node = tree.get(&internal)?;
    let parent = node.parent.ok_or(NodeError::HasNoParent(internal))?;

    let mut short_subtree = BTreeSet::new();

    for &child in node.children.iter() {
        short_subtree.extend(ucs_descending(tree, child)?);
    }

    if tree.get(&parent)?.is_root() {
        // The two edges incident to the root act as a single edge of the
        // unrooted tree, so the sides above it are the sibling's children
        for sibling in tree.siblings(&internal)? {
            let sibling_node = tree.get(&sibling)?;
            if sibling_node.is_tip() {
                if let Some(name) = &sibling_node.name {
                    short_subtree.insert(name.clone());
                }
            } else {
                for &child in sibling_node.children.iter() {
                    short_subtree.extend(ucs_descending(tree, child)?);
                }
            }
        }
    } else {
        for sibling in tree.siblings(&internal)? {
            short_subtree.extend(ucs_descending(tree, sibling)?);
        }
        short_subtree.extend(ucs_ascending(tree, internal)?);
    }

    Ok(short_subtree)
}

/// Graph over taxa where two taxa are adjacent when they appear together
/// in some short subtree of the guide tree.
struct ShortSubtreeGraph {
    names: Vec<String>,
    index: HashMap<String, usize>,
    adjacency: Vec<BTreeSet<usize>>,
}

impl ShortSubtreeGraph {
    fn new(short_subtrees: &[BTreeSet<String>]) -> Self {
        let mut names: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut adjacency: Vec<BTreeSet<usize>> = Vec::new();

        for short_subtree in short_subtrees {
            let ids: Vec<usize> = short_subtree
                .iter()
                .map(|name| {
                    *index.entry(name.clone()).or_insert_with(|| {
                        names.push(name.clone());
                        adjacency.push(BTreeSet::new());
                        names.len() - 1
                    })
                })
                .collect();

            // each short subtree forms a clique
            for (&a, &b) in ids.iter().tuple_combinations() {
                adjacency[a].insert(b);
                adjacency[b].insert(a);
            }
        }

        Self {
            names,
            index,
            adjacency,
        }
    }

    fn n_vertices(&self) -> usize {
        self.names.len()
    }

    fn group_names(&self, group: &BTreeSet<usize>) -> HashSet<String> {
        group.iter().map(|&v| self.names[v].clone()).collect()
    }

    /// Maximal cliques of the graph, by the vertex-ordering enumeration:
    /// every maximal clique of a graph built as a union of cliques shows
    /// up as some vertex together with its later neighbours.
    fn maximal_cliques(&self) -> Vec<Vec<usize>> {
        let n = self.n_vertices();
        let mut cliques = Vec::new();
        let mut seen = vec![0usize; n];

        for v in 0..n {
            let later: Vec<usize> = self.adjacency[v].iter().copied().filter(|&x| x > v).collect();

            if self.adjacency[v].is_empty() {
                cliques.push(vec![v]);
            }
            let Some(&first) = later.first() else {
                continue;
            };

            seen[first] = seen[first].max(later.len() - 1);

            if seen[v] < later.len() {
                let mut clique = later;
                clique.push(v);
                cliques.push(clique);
            }
        }

        cliques
    }

    /// Connected components left after removing the separator vertices.
    /// The separator itself belongs to no component.
    fn components_with_separator(&self, separator: &BTreeSet<usize>) -> Vec<BTreeSet<usize>> {
        let n = self.n_vertices();
        let mut uf = UnionFind::<usize>::new(n);

        for v in 0..n {
            if separator.contains(&v) {
                continue;
            }
            for &u in self.adjacency[v].iter() {
                if u > v && !separator.contains(&u) {
                    uf.union(v, u);
                }
            }
        }

        let mut groups: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
        for v in (0..n).filter(|v| !separator.contains(v)) {
            groups.entry(uf.find(v)).or_default().insert(v);
        }

        groups.into_values().collect()
    }
}

/// The short subtree around the most balanced edge of the tree, i.e. the
/// edge whose removal splits the tips most evenly.
fn centroid_heuristic_separator(tree: &Tree) -> Result<BTreeSet<String>, TreeError> {
    let root = tree.get_root()?;

    let mut tip_counts: HashMap<NodeId, usize> = HashMap::new();
    for id in tree.postorder(&root)? {
        let node = tree.get(&id)?;
        let count = if node.is_tip() {
            1
        } else {
            node.children.iter().map(|child| tip_counts[child]).sum()
        };
        tip_counts.insert(id, count);
    }
    let total = tip_counts[&root] as isize;

    let mut best: Option<(isize, NodeId)> = None;
    for id in tree.internal_nodes()? {
        let below = tip_counts[&id] as isize;
        let imbalance = (2 * below - total).abs();
        if best.map_or(true, |(current, _)| imbalance < current) {
            best = Some((imbalance, id));
        }
    }

    match best {
        Some((_, id)) => compute_short_subtree(tree, id),
        None => Ok(BTreeSet::new()),
    }
}

/// Tries every maximal clique of the graph as a separator and keeps the
/// partition whose largest part is smallest. Falls back to the whole
/// vertex set when no separator disconnects the graph.
fn find_optimal_partition(graph: &ShortSubtreeGraph) -> Vec<BTreeSet<usize>> {
    let all: BTreeSet<usize> = (0..graph.n_vertices()).collect();
    let mut best_score = all.len();
    let mut best = vec![all];

    for separator in graph.maximal_cliques() {
        let separator: BTreeSet<usize> = separator.into_iter().collect();
        let mut components = graph.components_with_separator(&separator);
        if components.len() <= 1 {
            continue;
        }

        for component in components.iter_mut() {
            component.extend(separator.iter().copied());
        }

        let score = components.iter().map(|c| c.len()).max().unwrap_or(0);
        if score < best_score {
            best_score = score;
            best = components;
        }
    }

    best
}

/// Splits the short subtree graph using the centroid edge's short subtree
/// as separator, falling back to the exhaustive clique search when the
/// heuristic fails to disconnect the graph. The separator is added to
/// every part so neighbouring subproblems overlap.
fn partition_short_subtree_graph(
    guide_tree: &Tree,
    graph: &ShortSubtreeGraph,
) -> Result<Vec<BTreeSet<usize>>, TreeError> {
    let separator_names = centroid_heuristic_separator(guide_tree)?;
    let separator: BTreeSet<usize> = separator_names
        .iter()
        .filter_map(|name| graph.index.get(name).copied())
        .collect();

    let mut components = graph.components_with_separator(&separator);
    if components.len() <= 1 {
        return Ok(find_optimal_partition(graph));
    }

    for component in components.iter_mut() {
        component.extend(separator.iter().copied());
    }

    Ok(components)
}

/// Splits a guide tree into overlapping induced subtrees, one per part of
/// the partitioned short subtree graph. A tree the partition cannot split
/// is returned whole.
pub fn split_tree(guide_tree: &Tree) -> Result<Vec<Tree>, TreeError> {
    let internal = guide_tree.internal_nodes()?;
    if internal.is_empty() {
        return Ok(vec![guide_tree.clone()]);
    }

    let mut short_subtrees = Vec::new();
    for id in internal {
        short_subtrees.push(compute_short_subtree(guide_tree, id)?);
    }
    let graph = ShortSubtreeGraph::new(&short_subtrees);

    let partition = partition_short_subtree_graph(guide_tree, &graph)?;
    debug!(
        taxa = graph.n_vertices(),
        parts = partition.len(),
        "partitioned short subtree graph"
    );

    let mut subtrees = Vec::new();
    for group in partition {
        if let Some(subtree) = guide_tree.induced(&graph.group_names(&group))? {
            subtrees.push(subtree);
        }
    }

    Ok(subtrees)
}

/// Recursively decomposes a guide tree into overlapping subproblems of at
/// most `max_subproblem_size` tips each.
///
/// Decomposition stops early, with a warning, on subtrees the short
/// subtree graph cannot split any further; those are returned oversized.
///
/// # Panics
/// Panics when `max_subproblem_size` is zero.
pub fn decompose(guide_tree: &Tree, max_subproblem_size: usize) -> Result<Vec<Tree>, TreeError> {
    assert!(
        max_subproblem_size > 0,
        "the maximum subproblem size must be positive"
    );

    let subtrees = split_tree(guide_tree)?;

    if subtrees.len() == 1 {
        if let Some(subtree) = subtrees.first() {
            if subtree.n_leaves() > max_subproblem_size {
                warn!(
                    leaves = subtree.n_leaves(),
                    max = max_subproblem_size,
                    "guide tree cannot be split below the maximum subproblem size"
                );
            }
        }
        return Ok(subtrees);
    }

    let mut result = Vec::new();
    for subtree in subtrees {
        if subtree.n_leaves() > max_subproblem_size {
            result.extend(decompose(&subtree, max_subproblem_size)?);
        } else {
            result.push(subtree);
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caterpillar() -> Tree {
        Tree::from_newick("(((((((a,b),c),d),e),f),g),h);").unwrap()
    }

    fn names(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn parent_of(tree: &Tree, name: &str) -> NodeId {
        tree.get_by_name(name).unwrap().parent.unwrap()
    }

    #[test]
    fn short_subtree_of_deep_edge() {
        let tree = caterpillar();
        // the edge above the (a,b) cherry
        let cherry = parent_of(&tree, "a");

        let short_subtree = compute_short_subtree(&tree, cherry).unwrap();
        assert_eq!(short_subtree, names(&["a", "b", "c", "d"]));
    }

    #[test]
    fn root_adjacent_short_subtree_includes_leaf_sibling() {
        let tree = caterpillar();
        // the child of the root whose sibling is the single tip h
        let near_root = parent_of(&tree, "g");

        let short_subtree = compute_short_subtree(&tree, near_root).unwrap();
        assert_eq!(short_subtree, names(&["f", "g", "h"]));
    }

    #[test]
    fn closest_tips_follow_branch_lengths() {
        let tree = Tree::from_newick("(((a:1,b:5):1,c:10):1,d:1);").unwrap();
        let root = tree.get_root().unwrap();

        // a is strictly closest to the root, b and c are further away
        let closest = ucs_descending(&tree, root).unwrap();
        assert_eq!(closest, names(&["d"]));

        let inner = parent_of(&tree, "a");
        assert_eq!(ucs_descending(&tree, inner).unwrap(), names(&["a"]));
    }

    #[test]
    fn separator_components() {
        let tree = caterpillar();
        let short_subtrees: Vec<BTreeSet<String>> = tree
            .internal_nodes()
            .unwrap()
            .into_iter()
            .map(|id| compute_short_subtree(&tree, id).unwrap())
            .collect();
        let graph = ShortSubtreeGraph::new(&short_subtrees);

        let separator: BTreeSet<usize> = names(&["c", "d", "e", "f"])
            .iter()
            .map(|name| graph.index[name])
            .collect();
        let components = graph.components_with_separator(&separator);

        assert_eq!(components.len(), 2);
        let sets: Vec<HashSet<String>> = components.iter().map(|c| graph.group_names(c)).collect();
        assert!(sets.contains(&names(&["a", "b"]).into_iter().collect()));
        assert!(sets.contains(&names(&["g", "h"]).into_iter().collect()));
    }

    #[test]
    fn decompose_covers_all_taxa_with_overlap() {
        let tree = caterpillar();
        let subproblems = decompose(&tree, 6).unwrap();

        assert_eq!(subproblems.len(), 2);
        for subproblem in subproblems.iter() {
            assert!(subproblem.n_leaves() <= 6);
        }

        let tip_sets: Vec<HashSet<String>> =
            subproblems.iter().map(|tree| tree.tip_names()).collect();

        let union: BTreeSet<String> = tip_sets.iter().flatten().cloned().collect();
        assert_eq!(union, names(&["a", "b", "c", "d", "e", "f", "g", "h"]));

        // neighbouring subproblems share the separator taxa
        let overlap: BTreeSet<String> = tip_sets[0]
            .intersection(&tip_sets[1])
            .cloned()
            .collect();
        assert_eq!(overlap, names(&["c", "d", "e", "f"]));
    }

    #[test]
    fn subproblems_are_induced_subtrees() {
        let tree = caterpillar();
        for subproblem in decompose(&tree, 6).unwrap() {
            let expected = tree.induced(&subproblem.tip_names()).unwrap().unwrap();
            assert_eq!(
                subproblem.to_newick().unwrap(),
                expected.to_newick().unwrap()
            );
        }
    }

    #[test]
    fn star_cannot_be_split() {
        let tree = Tree::from_newick("(a,b,c,d);").unwrap();
        let subproblems = decompose(&tree, 2).unwrap();

        // no internal edge to break, the tree comes back whole
        assert_eq!(subproblems.len(), 1);
        assert_eq!(subproblems[0].n_leaves(), 4);
    }

    #[test]
    fn small_trees_are_returned_whole() {
        let tree = Tree::from_newick("(a,b);").unwrap();
        let subproblems = decompose(&tree, 10).unwrap();

        assert_eq!(subproblems.len(), 1);
        assert_eq!(subproblems[0].to_newick().unwrap(), "(a,b);");
    }

    #[test]
    #[should_panic(expected = "must be positive")]
    fn zero_max_size_panics() {
        let tree = caterpillar();
        let _ = decompose(&tree, 0);
    }
}
