//! Partitioning strategies for connected proper cluster graphs.
//!
//! The supertree recursion calls into this module only when the proper
//! cluster graph is connected: the partitioner must then produce two or
//! more vertex groups. Two interchangeable strategies are provided, an
//! exact one built on the global minimum cut and an approximate spectral
//! one for large graphs.

use std::collections::{BTreeMap, VecDeque};

use clap::ValueEnum;
use fixedbitset::FixedBitSet;
use ndarray::{Array1, Array2};
use petgraph::unionfind::UnionFind;
use rand::Rng;

use crate::pcg::ProperClusterGraph;

const EPS: f64 = 1e-9;

/// Strategy used to split a connected proper cluster graph.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Partitioner {
    /// Exact: delete every edge lying on some global minimum-weight cut
    /// and split into the resulting connected components. Deleting all
    /// such edges (rather than the two sides of a single cut) is what
    /// collapses fully conflicting inputs into polytomies.
    MinCut,
    /// Approximate: bipartition by the sign of the Fiedler vector of the
    /// weighted graph Laplacian. Faster on large graphs but not
    /// guaranteed minimal, and not deterministic across runs.
    Spectral,
}

impl Default for Partitioner {
    fn default() -> Self {
        Self::MinCut
    }
}

impl Partitioner {
    /// Splits the graph into two or more vertex groups. Graphs with fewer
    /// than two vertices are returned as a single group: there is nothing
    /// to split and the caller must treat the group as unresolvable.
    pub fn partition(&self, pcg: &ProperClusterGraph) -> Vec<Vec<usize>> {
        let n = pcg.n_vertices();
        if n < 2 {
            return vec![(0..n).collect()];
        }

        match self {
            Self::MinCut => min_cut_partition(pcg),
            Self::Spectral => spectral_partition(pcg),
        }
    }
}

/// Symmetric adjacency matrix of the graph's edge weights
fn adjacency(pcg: &ProperClusterGraph) -> Vec<Vec<f64>> {
    let n = pcg.n_vertices();
    let mut adj = vec![vec![0.0; n]; n];
    for (&(u, v), &w) in pcg.edges() {
        adj[u][v] = w;
        adj[v][u] = w;
    }
    adj
}

/// Weight of the global minimum cut (Stoer-Wagner).
///
/// Runs maximum adjacency orderings, recording the cut-of-the-phase and
/// merging the two last-added vertices, until one vertex remains.
fn stoer_wagner(mut adj: Vec<Vec<f64>>) -> f64 {
    let mut active: Vec<usize> = (0..adj.len()).collect();
    let mut best = f64::INFINITY;

    while active.len() > 1 {
        let len = active.len();
        let mut in_order = FixedBitSet::with_capacity(len);
        in_order.insert(0);

        // connection weight of each remaining vertex to the growing set
        let mut weights: Vec<f64> = active.iter().map(|&v| adj[active[0]][v]).collect();

        let mut prev = 0;
        let mut last = 0;
        for _ in 1..len {
            let mut sel = None;
            for i in 0..len {
                if !in_order.contains(i) && sel.map_or(true, |s: usize| weights[i] > weights[s]) {
                    sel = Some(i);
                }
            }
            let sel = sel.unwrap();

            in_order.insert(sel);
            prev = last;
            last = sel;

            for i in 0..len {
                if !in_order.contains(i) {
                    weights[i] += adj[active[sel]][active[i]];
                }
            }
        }

        // cut of the phase: the last vertex against everything else
        best = best.min(weights[last]);

        // merge the two vertices added last
        let (merged, kept) = (active[last], active[prev]);
        for i in 0..len {
            if i != last && i != prev {
                let v = active[i];
                adj[kept][v] += adj[merged][v];
                adj[v][kept] = adj[kept][v];
            }
        }
        active.remove(last);
    }

    best
}

/// Weight of the minimum cut separating `s` from `t`, by Edmonds-Karp
/// max-flow on the undirected capacity matrix.
fn min_st_cut(adj: &[Vec<f64>], s: usize, t: usize) -> f64 {
    let n = adj.len();
    let mut cap: Vec<Vec<f64>> = adj.to_vec();
    let mut flow = 0.0;

    loop {
        // shortest augmenting path with positive residual capacity
        let mut parent = vec![usize::MAX; n];
        parent[s] = s;
        let mut queue = VecDeque::from(vec![s]);
        'bfs: while let Some(u) = queue.pop_front() {
            for v in 0..n {
                if parent[v] == usize::MAX && cap[u][v] > EPS {
                    parent[v] = u;
                    if v == t {
                        break 'bfs;
                    }
                    queue.push_back(v);
                }
            }
        }
        if parent[t] == usize::MAX {
            break;
        }

        let mut bottleneck = f64::INFINITY;
        let mut v = t;
        while v != s {
            let u = parent[v];
            bottleneck = bottleneck.min(cap[u][v]);
            v = u;
        }

        let mut v = t;
        while v != s {
            let u = parent[v];
            cap[u][v] -= bottleneck;
            cap[v][u] += bottleneck;
            v = u;
        }
        flow += bottleneck;
    }

    flow
}

fn approx_le(a: f64, b: f64) -> bool {
    a <= b + b.abs() * EPS + EPS
}

/// Exact partition: removes every edge that lies on some global minimum
/// cut, then groups the remaining connected components.
///
/// An edge (u,v) lies on a global minimum cut exactly when the minimum
/// u-v cut weight equals the global minimum cut weight: any cut separating
/// u and v is a global cut, so the minimum u-v cut can never be lighter.
fn min_cut_partition(pcg: &ProperClusterGraph) -> Vec<Vec<usize>> {
    let n = pcg.n_vertices();
    let adj = adjacency(pcg);
    let lambda = stoer_wagner(adj.clone());

    let mut uf = UnionFind::<usize>::new(n);
    for &(u, v) in pcg.edges().keys() {
        if !approx_le(min_st_cut(&adj, u, v), lambda) {
            uf.union(u, v);
        }
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for v in 0..n {
        groups.entry(uf.find(v)).or_default().push(v);
    }

    groups.into_values().collect()
}

/// Approximate partition: thresholds the Fiedler vector of the weighted
/// graph Laplacian at zero, falling back to a median split when one side
/// would come out empty.
fn spectral_partition(pcg: &ProperClusterGraph) -> Vec<Vec<usize>> {
    let n = pcg.n_vertices();

    let mut laplacian = Array2::<f64>::zeros((n, n));
    for (&(u, v), &w) in pcg.edges() {
        laplacian[[u, u]] += w;
        laplacian[[v, v]] += w;
        laplacian[[u, v]] -= w;
        laplacian[[v, u]] -= w;
    }

    let fiedler = fiedler_vector(&laplacian);

    let mut left: Vec<usize> = (0..n).filter(|&v| fiedler[v] < 0.0).collect();
    let mut right: Vec<usize> = (0..n).filter(|&v| fiedler[v] >= 0.0).collect();

    if left.is_empty() || right.is_empty() {
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            fiedler[a]
                .partial_cmp(&fiedler[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        left = order[..n / 2].to_vec();
        right = order[n / 2..].to_vec();
    }

    vec![left, right]
}

/// Eigenvector for the second-smallest eigenvalue of the Laplacian, by
/// power iteration on the spectrum-reversed matrix with the constant
/// eigenvector projected out at every step.
fn fiedler_vector(laplacian: &Array2<f64>) -> Array1<f64> {
    let n = laplacian.nrows();

    // shift so every eigenvalue of (shift*I - L) is positive and their
    // order is reversed; the Laplacian spectrum is bounded by twice the
    // maximum degree
    let shift = 2.0 * laplacian.diag().iter().fold(0.0f64, |acc, &d| acc.max(d)) + 1.0;
    let mut reversed = laplacian.mapv(|v| -v);
    for i in 0..n {
        reversed[[i, i]] += shift;
    }

    let mut rng = rand::thread_rng();
    let mut x = Array1::from_shape_fn(n, |_| rng.gen::<f64>() - 0.5);

    for _ in 0..200 {
        // project out the constant eigenvector of eigenvalue `shift`
        let mean = x.mean().unwrap_or(0.0);
        x -= mean;

        let y = reversed.dot(&x);
        let norm = y.dot(&y).sqrt();
        if norm < EPS {
            break;
        }
        x = y / norm;
    }

    let mean = x.mean().unwrap_or(0.0);
    x - mean
}
