//! Information-content scores and their per-edge aggregation.
//!
//! Every score is folded onto reference tree edges by minimum: an edge
//! keeps the lowest score of any quartet (LQ-IC) or metaquartet (EQP-IC)
//! whose inner path covers it. Edges that nothing covers stay at
//! `f64::INFINITY`.

use crate::tree::{EdgeId, IndexedTree, NodeId};
use std::collections::HashMap;

/// Signed information content of the three topology counts of a quartet,
/// `q1` being the count of the reference topology.
///
/// `1 + Σ p·log3(p)` over the non-zero frequencies `p`, so 1 for full
/// agreement and 0 for an even three-way split. The score is negated when
/// `q1` is not the strict maximum. Unobserved quartets score 0.
pub fn log_score(q1: u64, q2: u64, q3: u64) -> f64 {
    let n = q1 + q2 + q3;
    if n == 0 {
        return 0.0;
    }

    let total = n as f64;
    let ln3 = 3f64.ln();
    let score = [q1, q2, q3]
        .into_iter()
        .filter(|&q| q > 0)
        .map(|q| q as f64 / total)
        .fold(1.0, |acc, p| acc + p * p.ln() / ln3);

    if q1 > q2 && q1 > q3 { score } else { -score }
}

#[inline]
fn min_fold(slot: &mut f64, score: f64) {
    if score < *slot {
        *slot = score;
    }
}

/// LQ-IC, QP-IC and EQP-IC per reference tree edge, indexed by [`EdgeId`].
#[derive(Debug, Clone, PartialEq)]
pub struct QuartetScores {
    lq_ic: Vec<f64>,
    qp_ic: Vec<f64>,
    eqp_ic: Vec<f64>,
}

impl QuartetScores {
    pub fn lq_ic_scores(&self) -> &[f64] {
        &self.lq_ic
    }

    /// All `f64::INFINITY` for a multifurcating reference tree.
    pub fn qp_ic_scores(&self) -> &[f64] {
        &self.qp_ic
    }

    /// All `f64::INFINITY` for a multifurcating reference tree.
    pub fn eqp_ic_scores(&self) -> &[f64] {
        &self.eqp_ic
    }

    pub fn edge_count(&self) -> usize {
        self.lq_ic.len()
    }

    /// `(lq_ic, qp_ic, eqp_ic)` of one edge.
    pub fn edge(&self, edge: EdgeId) -> (f64, f64, f64) {
        (self.lq_ic[edge], self.qp_ic[edge], self.eqp_ic[edge])
    }

    pub fn into_vecs(self) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        (self.lq_ic, self.qp_ic, self.eqp_ic)
    }
}

/// Scores gathered by one worker.
///
/// Workers never share state: each folds into its own partial, and the
/// partials are combined with [`PartialScores::merge`] at the end. Both
/// the minimum and the count sums are order-independent, so the result
/// does not depend on scheduling.
#[derive(Debug, Clone)]
pub(crate) struct PartialScores {
    lq_ic: Vec<f64>,
    /// Summed `(q1, q2, q3)` per metaquartet, keyed by `(min, max)` node id.
    node_pairs: HashMap<(NodeId, NodeId), [u64; 3]>,
}

impl PartialScores {
    pub fn new(edge_count: usize) -> Self {
        PartialScores { lq_ic: vec![f64::INFINITY; edge_count], node_pairs: HashMap::new() }
    }

    /// Min-fold `score` onto every edge on the path between `u` and `v`.
    pub fn fold_lq_ic(&mut self, tree: &IndexedTree, u: NodeId, v: NodeId, score: f64) {
        for edge in tree.path_edges(u, v) {
            min_fold(&mut self.lq_ic[edge], score);
        }
    }

    pub fn add_node_pair_counts(&mut self, u: NodeId, v: NodeId, counts: [u64; 3]) {
        let entry = self.node_pairs.entry((u.min(v), u.max(v))).or_insert([0; 3]);
        for (total, count) in entry.iter_mut().zip(counts) {
            *total += count;
        }
    }

    pub fn merge(mut self, mut other: PartialScores) -> PartialScores {
        for (slot, score) in self.lq_ic.iter_mut().zip(&other.lq_ic) {
            min_fold(slot, *score);
        }
        if self.node_pairs.len() < other.node_pairs.len() {
            std::mem::swap(&mut self.node_pairs, &mut other.node_pairs);
        }
        for ((u, v), counts) in other.node_pairs {
            self.add_node_pair_counts(u, v, counts);
        }
        self
    }

    /// Turn the summed metaquartet counts into QP-IC and EQP-IC.
    ///
    /// QP-IC is set on the edge joining an adjacent node pair, EQP-IC is
    /// min-folded along the path of every node pair.
    pub fn finalize(self, tree: &IndexedTree) -> QuartetScores {
        let edge_count = self.lq_ic.len();
        let mut qp_ic = vec![f64::INFINITY; edge_count];
        let mut eqp_ic = vec![f64::INFINITY; edge_count];

        for ((u, v), [q1, q2, q3]) in self.node_pairs {
            let score = log_score(q1, q2, q3);
            if let Some(edge) = tree.edge_between(u, v) {
                qp_ic[edge] = score;
            }
            for edge in tree.path_edges(u, v) {
                min_fold(&mut eqp_ic[edge], score);
            }
        }

        QuartetScores { lq_ic: self.lq_ic, qp_ic, eqp_ic }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    #[test]
    fn test_log_score_fixed_points() {
        assert_eq!(log_score(0, 0, 0), 0.0);
        for n in [1, 2, 17, 1000] {
            assert!((log_score(n, 0, 0) - 1.0).abs() < EPS);
        }
        for k in [1, 5, 333] {
            assert!(log_score(k, k, k).abs() < EPS);
        }
    }

    #[test]
    fn test_log_score_sign() {
        let positive = log_score(8, 1, 1);
        assert!(positive > 0.0 && positive < 1.0);
        // same frequencies, reference topology no longer dominant
        assert!((log_score(1, 8, 1) + positive).abs() < EPS);
        assert!((log_score(1, 1, 8) + positive).abs() < EPS);
        // tie for the maximum is not a strict maximum
        assert!(log_score(5, 5, 0) < 0.0);
        assert!(log_score(5, 0, 5) < 0.0);
        assert!(log_score(6, 5, 5) > 0.0);
    }

    #[test]
    fn test_log_score_bounds() {
        for q1 in 0..6 {
            for q2 in 0..6 {
                for q3 in 0..6 {
                    let s = log_score(q1, q2, q3);
                    assert!((-1.0 - EPS..=1.0 + EPS).contains(&s), "{q1} {q2} {q3} -> {s}");
                }
            }
        }
    }

    #[test]
    fn test_log_score_symmetric_in_alternatives() {
        assert!((log_score(7, 2, 1) - log_score(7, 1, 2)).abs() < EPS);
    }

    fn tree() -> IndexedTree {
        IndexedTree::from_newick("((A,B),(C,(D,E)),(F,G));").unwrap()
    }

    fn inner_pair(t: &IndexedTree, x: &str, y: &str) -> NodeId {
        t.lowest_common_ancestor(t.find_leaf(x).unwrap(), t.find_leaf(y).unwrap())
    }

    #[test]
    fn test_fold_and_merge_keep_minimum() {
        let t = tree();
        let ab = inner_pair(&t, "A", "B");
        let de = inner_pair(&t, "D", "E");

        let mut left = PartialScores::new(t.edge_count());
        left.fold_lq_ic(&t, ab, de, 0.5);
        let mut right = PartialScores::new(t.edge_count());
        right.fold_lq_ic(&t, ab, de, 0.25);
        right.fold_lq_ic(&t, ab, de, 0.75);

        let scores = left.merge(right).finalize(&t);
        let covered: Vec<_> = t.path_edges(ab, de).collect();
        assert_eq!(covered.len(), 3);
        for e in 0..t.edge_count() {
            let expected = if covered.contains(&e) { 0.25 } else { f64::INFINITY };
            assert_eq!(scores.lq_ic_scores()[e], expected);
        }
        assert!(scores.qp_ic_scores().iter().all(|s| s.is_infinite()));
    }

    #[test]
    fn test_node_pair_counts_finalize() {
        let t = tree();
        let ab = inner_pair(&t, "A", "B");
        let de = inner_pair(&t, "D", "E");
        let cde = t.parent(de).unwrap();

        let mut left = PartialScores::new(t.edge_count());
        left.add_node_pair_counts(de, cde, [3, 0, 0]);
        left.add_node_pair_counts(ab, de, [1, 1, 0]);
        let mut right = PartialScores::new(t.edge_count());
        right.add_node_pair_counts(cde, de, [3, 0, 0]);
        right.add_node_pair_counts(de, ab, [1, 0, 1]);

        let scores = left.merge(right).finalize(&t);
        let adjacent = t.edge_between(de, cde).unwrap();
        assert!((scores.qp_ic_scores()[adjacent] - 1.0).abs() < EPS);

        // ab–de sums to (2, 1, 1): weaker, and it covers the adjacent edge too
        let weak = log_score(2, 1, 1);
        assert!(weak < 1.0);
        for e in t.path_edges(ab, de) {
            assert_eq!(scores.eqp_ic_scores()[e], weak);
        }
        let finite = scores.qp_ic_scores().iter().filter(|s| s.is_finite()).count();
        assert_eq!(finite, 1);
    }
}
