//! Topology occurrence counts over a collection of evaluation trees.
//!
//! # Overview
//! For every quartet of taxa, the lookup table records how often each of its
//! three topologies occurs among the evaluation trees. Scoring only needs
//! read access through [`TopologyCounts`]; the table itself comes in two
//! layouts chosen by [`crate::memory::MemoryEstimate::choose`].
//!
//! # Counting
//! A tree displays the topology `ab|cd` exactly when the paths `a–b` and
//! `c–d` are joined by a path of at least one edge. Its end points `u` and
//! `v` are two distinct inner nodes, `a` and `b` hang off two different
//! arms of `u` (arms = subtrees not containing `v`), `c` and `d` off two
//! different arms of `v`. Enumerating every pair of inner nodes and every
//! pair of arms at each end therefore visits every resolved quartet of the
//! tree exactly once. Quartets around a polytomy have no such path and are
//! not counted.

use crate::error::{QuartetError, Result};
use crate::memory::LookupStrategy;
use crate::quartet::{self, TaxonId, Topology};
use crate::taxa::TaxonMap;
use crate::tree::{IndexedTree, LinkId};
use itertools::Itertools;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

/// Counter width of the lookup tables.
pub type Count = u32;

/// Source of topology counts for any four taxa.
pub trait TopologyCounts: Sync {
    /// Occurrences of the three topologies of `{a, b, c, d}`, indexed by
    /// [`Topology::tag`]. The argument order does not matter.
    fn topology_counts(&self, a: TaxonId, b: TaxonId, c: TaxonId, d: TaxonId) -> [u64; 3];

    /// Occurrences of `ab|cd`, `ac|bd` and `ad|bc`, in that order.
    fn reference_counts(&self, a: TaxonId, b: TaxonId, c: TaxonId, d: TaxonId) -> [u64; 3] {
        let counts = self.topology_counts(a, b, c, d);
        [
            counts[Topology::classify(a, b, c, d).tag()],
            counts[Topology::classify(a, c, b, d).tag()],
            counts[Topology::classify(a, d, b, c).tag()],
        ]
    }
}

impl<F> TopologyCounts for F
where
    F: Fn(TaxonId, TaxonId, TaxonId, TaxonId) -> [u64; 3] + Sync,
{
    fn topology_counts(&self, a: TaxonId, b: TaxonId, c: TaxonId, d: TaxonId) -> [u64; 3] {
        self(a, b, c, d)
    }
}

fn ascending(a: TaxonId, b: TaxonId, c: TaxonId, d: TaxonId) -> [TaxonId; 4] {
    let [t1, t2, t3, t4] = quartet::descending(a, b, c, d);
    [t4, t3, t2, t1]
}

/// One counter per ordered 4-tuple of taxa. Each topology is stored at the
/// tuple given by [`Topology::arrange`].
#[derive(Debug)]
pub struct DenseTable {
    num_taxa: usize,
    counts: Vec<AtomicU32>,
}

impl DenseTable {
    pub fn new(num_taxa: usize) -> Self {
        let slots = num_taxa.pow(4);
        DenseTable { num_taxa, counts: (0..slots).map(|_| AtomicU32::new(0)).collect() }
    }

    #[inline]
    fn index(&self, [x, y, z, w]: [TaxonId; 4]) -> usize {
        let n = self.num_taxa;
        ((x * n + y) * n + z) * n + w
    }

    /// Count one occurrence of `ab|cd`.
    pub fn record(&self, a: TaxonId, b: TaxonId, c: TaxonId, d: TaxonId) {
        let topology = Topology::classify(a, b, c, d);
        let slot = self.index(topology.arrange(ascending(a, b, c, d)));
        self.counts[slot].fetch_add(1, Ordering::Relaxed);
    }
}

impl TopologyCounts for DenseTable {
    fn topology_counts(&self, a: TaxonId, b: TaxonId, c: TaxonId, d: TaxonId) -> [u64; 3] {
        let sorted = ascending(a, b, c, d);
        Topology::ALL.map(|t| self.counts[self.index(t.arrange(sorted))].load(Ordering::Relaxed) as u64)
    }
}

/// Binomial coefficient `C(n, k)` for `k <= 4`.
fn choose(n: usize, k: usize) -> usize {
    if n < k {
        return 0;
    }
    (0..k).fold(1, |acc, i| acc * (n - i) / (i + 1))
}

/// Position of a sorted quartet among all `C(n, 4)` quartets in
/// colexicographic order.
fn quartet_rank([s0, s1, s2, s3]: [TaxonId; 4]) -> usize {
    choose(s0, 1) + choose(s1, 2) + choose(s2, 3) + choose(s3, 4)
}

/// Three counters per unordered quartet, one for each topology. The
/// quartet's slots start at three times its colexicographic rank.
#[derive(Debug)]
pub struct SparseTable {
    counts: Vec<AtomicU32>,
}

impl SparseTable {
    pub fn new(num_taxa: usize) -> Self {
        let slots = choose(num_taxa, 4) * Topology::ALL.len();
        SparseTable { counts: (0..slots).map(|_| AtomicU32::new(0)).collect() }
    }

    /// Count one occurrence of `ab|cd`.
    pub fn record(&self, a: TaxonId, b: TaxonId, c: TaxonId, d: TaxonId) {
        let slot = quartet_rank(ascending(a, b, c, d)) * 3 + Topology::classify(a, b, c, d).tag();
        self.counts[slot].fetch_add(1, Ordering::Relaxed);
    }
}

impl TopologyCounts for SparseTable {
    fn topology_counts(&self, a: TaxonId, b: TaxonId, c: TaxonId, d: TaxonId) -> [u64; 3] {
        let first = quartet_rank(ascending(a, b, c, d)) * 3;
        Topology::ALL.map(|t| self.counts[first + t.tag()].load(Ordering::Relaxed) as u64)
    }
}

/// Topology counts of all evaluation trees.
#[derive(Debug)]
pub enum QuartetTable {
    Dense(DenseTable),
    Sparse(SparseTable),
}

impl QuartetTable {
    /// Parse every evaluation tree and count its resolved quartets.
    ///
    /// Trees are processed in parallel on the current rayon pool.
    ///
    /// # Errors
    /// `NoEvaluationTrees` for an empty input, otherwise the first parse or
    /// taxon error of any tree.
    pub fn build(
        strategy: LookupStrategy,
        taxa: &TaxonMap,
        newicks: &[String],
        translate: Option<&HashMap<String, String>>,
    ) -> Result<Self> {
        if newicks.is_empty() {
            return Err(QuartetError::NoEvaluationTrees);
        }

        let table = match strategy {
            LookupStrategy::Dense => QuartetTable::Dense(DenseTable::new(taxa.len())),
            LookupStrategy::Sparse => QuartetTable::Sparse(SparseTable::new(taxa.len())),
        };
        newicks.par_iter().enumerate().try_for_each(|(index, newick)| -> Result<()> {
            let (tree, tree_taxa) = index_evaluation_tree(index, newick, taxa, translate)?;
            for_each_resolved_quartet(&tree, &tree_taxa, |a, b, c, d| match &table {
                QuartetTable::Dense(t) => t.record(a, b, c, d),
                QuartetTable::Sparse(t) => t.record(a, b, c, d),
            });
            Ok(())
        })?;
        Ok(table)
    }

    pub fn strategy(&self) -> LookupStrategy {
        match self {
            QuartetTable::Dense(_) => LookupStrategy::Dense,
            QuartetTable::Sparse(_) => LookupStrategy::Sparse,
        }
    }

    /// Bytes held by the counters.
    pub fn memory_bytes(&self) -> usize {
        let slots = match self {
            QuartetTable::Dense(t) => t.counts.len(),
            QuartetTable::Sparse(t) => t.counts.len(),
        };
        slots * std::mem::size_of::<AtomicU32>()
    }
}

impl TopologyCounts for QuartetTable {
    fn topology_counts(&self, a: TaxonId, b: TaxonId, c: TaxonId, d: TaxonId) -> [u64; 3] {
        match self {
            QuartetTable::Dense(table) => table.topology_counts(a, b, c, d),
            QuartetTable::Sparse(table) => table.topology_counts(a, b, c, d),
        }
    }
}

fn index_evaluation_tree(
    index: usize,
    newick: &str,
    taxa: &TaxonMap,
    translate: Option<&HashMap<String, String>>,
) -> Result<(IndexedTree, Vec<Option<TaxonId>>)> {
    let tree = IndexedTree::from_newick(newick).map_err(|e| match e {
        QuartetError::Newick { message, .. } => QuartetError::Newick { index, message },
        other => other,
    })?;
    let tree_taxa = taxa.node_taxa(&tree, translate)?;
    Ok((tree, tree_taxa))
}

fn arm_taxa(tree: &IndexedTree, taxa: &[Option<TaxonId>], link: LinkId) -> Vec<TaxonId> {
    tree.range_leaves(tree.subtree_leaves(link)).filter_map(|v| taxa[v]).collect()
}

/// Call `record(a, b, c, d)` once for every quartet topology `ab|cd`
/// displayed by `tree`.
pub fn for_each_resolved_quartet<F>(tree: &IndexedTree, taxa: &[Option<TaxonId>], mut record: F)
where
    F: FnMut(TaxonId, TaxonId, TaxonId, TaxonId),
{
    let inner = tree.inner_nodes();
    for (i, &u) in inner.iter().enumerate() {
        for &v in &inner[i + 1..] {
            let (lu, lv) = tree.path_inner_links(u, v);
            let arms_u: Vec<Vec<TaxonId>> = tree.links_around(lu).skip(1).map(|l| arm_taxa(tree, taxa, l)).collect();
            let arms_v: Vec<Vec<TaxonId>> = tree.links_around(lv).skip(1).map(|l| arm_taxa(tree, taxa, l)).collect();

            for (s1, s2) in arms_u.iter().tuple_combinations() {
                for (s3, s4) in arms_v.iter().tuple_combinations() {
                    for &a in s1 {
                        for &b in s2 {
                            for &c in s3 {
                                for &d in s4 {
                                    record(a, b, c, d);
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}
