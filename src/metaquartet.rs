//! Quartet enumeration over the reference tree.
//!
//! # Overview
//! Removing the inner path between two inner nodes `u` and `v` of a
//! bifurcating tree leaves four arms, two hanging off each end:
//!
//! ```text
//!     S1             S3
//!       \           /
//!        u -- ... -- v
//!       /           \
//!     S2             S4
//! ```
//!
//! Every quartet drawn one taxon per arm has the reference topology
//! `S1 S2 | S3 S4` and the inner path `u–v`. The set of these quartets is
//! the *metaquartet* of `(u, v)`; together the metaquartets of all inner
//! node pairs cover every quartet exactly once.
//!
//! # Modes
//! - bifurcating, [`EnumerationMode::NodePairs`]: one work unit per inner
//!   node, scoring all metaquartets where it is the smaller node.
//! - bifurcating, [`EnumerationMode::Quartets`]: one work unit per first
//!   leaf, resolving each quartet on its own and finding its metaquartet.
//! - multifurcating: quartets as above, LQ-IC only. A quartet whose taxa
//!   meet at a polytomy has no inner path and is skipped.
//!
//! All modes fold into per-worker [`PartialScores`] merged at the end.

use crate::config::EnumerationMode;
use crate::error::{QuartetError, Result};
use crate::lookup::TopologyCounts;
use crate::quartet::TaxonId;
use crate::scores::{PartialScores, QuartetScores, log_score};
use crate::tree::{IndexedTree, LinkId, NodeId};
use itertools::Itertools;
use rayon::prelude::*;

/// A quartet `ab|cd` displayed by the reference tree, with the inner nodes
/// bounding its inner path on the `ab` and `cd` side.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ResolvedQuartet {
    pub leaves: [NodeId; 4],
    pub ab_side: NodeId,
    pub cd_side: NodeId,
}

pub struct QuartetScoreComputer<'a, C: TopologyCounts> {
    tree: &'a IndexedTree,
    /// Taxon id per reference node, only read for leaves.
    taxa: &'a [TaxonId],
    counts: &'a C,
}

impl<'a, C: TopologyCounts> QuartetScoreComputer<'a, C> {
    pub fn new(tree: &'a IndexedTree, taxa: &'a [TaxonId], counts: &'a C) -> Self {
        QuartetScoreComputer { tree, taxa, counts }
    }

    /// Score every edge of the reference tree on the current rayon pool.
    ///
    /// `mode` only matters for bifurcating trees; both modes give the same
    /// scores.
    pub fn compute(&self, mode: EnumerationMode) -> Result<QuartetScores> {
        if !self.tree.is_bifurcating() {
            return self.score_quartets(false);
        }
        match mode {
            EnumerationMode::NodePairs => Ok(self.score_node_pairs()),
            EnumerationMode::Quartets => self.score_quartets(true),
        }
    }

    /// The four arm links of the metaquartet `(u, v)`: the two links of `u`
    /// not pointing towards `v`, then the same for `v`.
    fn arm_links(&self, u: NodeId, v: NodeId) -> [LinkId; 4] {
        let t = self.tree;
        let (lu, lv) = t.path_inner_links(u, v);
        [t.next(lu), t.next(t.next(lu)), t.next(lv), t.next(t.next(lv))]
    }

    fn arm_taxa(&self, link: LinkId) -> Vec<TaxonId> {
        self.tree
            .range_leaves(self.tree.subtree_leaves(link))
            .map(|leaf| self.taxa[leaf])
            .collect()
    }

    fn score_node_pairs(&self) -> QuartetScores {
        let inner = self.tree.inner_nodes();
        let edge_count = self.tree.edge_count();

        (0..inner.len())
            .into_par_iter()
            .fold(
                || PartialScores::new(edge_count),
                |mut acc, i| {
                    for &v in &inner[i + 1..] {
                        self.score_metaquartet(inner[i], v, &mut acc);
                    }
                    acc
                },
            )
            .reduce(|| PartialScores::new(edge_count), PartialScores::merge)
            .finalize(self.tree)
    }

    /// All quartets of a metaquartet share the inner path `u–v`, so the
    /// lowest quartet score is folded once.
    fn score_metaquartet(&self, u: NodeId, v: NodeId, acc: &mut PartialScores) {
        let [s1, s2, s3, s4] = self.arm_links(u, v).map(|link| self.arm_taxa(link));

        let mut totals = [0u64; 3];
        let mut lowest = f64::INFINITY;
        for &a in &s1 {
            for &b in &s2 {
                for &c in &s3 {
                    for &d in &s4 {
                        let counts = self.counts.reference_counts(a, b, c, d);
                        lowest = lowest.min(log_score(counts[0], counts[1], counts[2]));
                        for (total, count) in totals.iter_mut().zip(counts) {
                            *total += count;
                        }
                    }
                }
            }
        }

        acc.fold_lq_ic(self.tree, u, v, lowest);
        acc.add_node_pair_counts(u, v, totals);
    }

    fn score_quartets(&self, with_node_pairs: bool) -> Result<QuartetScores> {
        let leaves = self.tree.leaves();
        let edge_count = self.tree.edge_count();

        let partial = (0..leaves.len())
            .into_par_iter()
            .try_fold(
                || PartialScores::new(edge_count),
                |mut acc, i| -> Result<PartialScores> {
                    for (j, k, l) in (i + 1..leaves.len()).tuple_combinations() {
                        let quadruple = [leaves[i], leaves[j], leaves[k], leaves[l]];
                        if let Some(resolved) = self.resolve(quadruple) {
                            self.score_quartet(resolved, with_node_pairs, &mut acc)?;
                        }
                    }
                    Ok(acc)
                },
            )
            .try_reduce(|| PartialScores::new(edge_count), |a, b| Ok(a.merge(b)))?;

        Ok(partial.finalize(self.tree))
    }

    fn score_quartet(&self, resolved: ResolvedQuartet, with_node_pairs: bool, acc: &mut PartialScores) -> Result<()> {
        let (u, v) = (resolved.ab_side, resolved.cd_side);
        let leaves = if with_node_pairs {
            self.reference_order(u.min(v), u.max(v), resolved.leaves)?
        } else {
            resolved.leaves
        };
        let [a, b, c, d] = leaves.map(|leaf| self.taxa[leaf]);

        let counts = self.counts.reference_counts(a, b, c, d);
        acc.fold_lq_ic(self.tree, u, v, log_score(counts[0], counts[1], counts[2]));
        if with_node_pairs {
            acc.add_node_pair_counts(u, v, counts);
        }
        Ok(())
    }

    /// The topology the reference tree displays on four leaves.
    ///
    /// For each of the three pairings `ab|cd`, measure the edge distance
    /// between `lca(a, b)` and `lca(c, d)`. The displayed pairing is the one
    /// with the strictly greatest distance; `None` when there is no strict
    /// winner, i.e. the four leaves meet in a single node.
    pub fn resolve(&self, [w, x, y, z]: [NodeId; 4]) -> Option<ResolvedQuartet> {
        let t = self.tree;
        let pairings = [[w, x, y, z], [w, y, x, z], [w, z, x, y]];
        let distances = pairings.map(|[a, b, c, d]| {
            t.edge_distance(t.lowest_common_ancestor(a, b), t.lowest_common_ancestor(c, d))
        });

        let winner = (0..3).find(|&i| (0..3).all(|j| j == i || distances[j] < distances[i]))?;
        let [a, b, c, d] = pairings[winner];
        let (ab_side, cd_side) = t.quartet_node_pair(a, b, c, d);
        Some(ResolvedQuartet { leaves: pairings[winner], ab_side, cd_side })
    }

    /// Arrange the leaves of a quartet of the metaquartet `(u, v)` so the
    /// i-th leaf lies in the i-th arm of [`Self::arm_links`].
    ///
    /// # Errors
    /// `LeafNotInSubtree` when an arm holds none of the four leaves.
    pub fn reference_order(&self, u: NodeId, v: NodeId, quartet: [NodeId; 4]) -> Result<[NodeId; 4]> {
        let mut ordered = [0; 4];
        for (slot, link) in ordered.iter_mut().zip(self.arm_links(u, v)) {
            let range = self.tree.subtree_leaves(link);
            *slot = quartet
                .iter()
                .copied()
                .find(|&leaf| self.tree.leaf_position(leaf).is_some_and(|p| range.contains(p)))
                .ok_or(QuartetError::LeafNotInSubtree { link, quartet })?;
        }
        Ok(ordered)
    }
}
