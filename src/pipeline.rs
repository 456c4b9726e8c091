//! End-to-end scoring run.

use std::time::Instant;

use tracing::{debug, info};

use crate::config::ScoringConfig;
use crate::error::Result;
use crate::io::EvaluationTrees;
use crate::lookup::QuartetTable;
use crate::memory::MemoryEstimate;
use crate::metaquartet::QuartetScoreComputer;
use crate::scores::QuartetScores;
use crate::taxa::TaxonMap;
use crate::tree::IndexedTree;

/// Score every edge of `reference` against `evaluation`.
///
/// The memory plan is made before any evaluation tree is parsed, so a run
/// that cannot fit fails before doing any work. `available_memory` is
/// queried once; pass [`crate::memory::available_memory_or_unlimited`]
/// outside tests.
///
/// # Errors
/// `InsufficientMemory` when not even the sparse table fits, otherwise any
/// taxon, parse or thread pool error.
pub fn score_trees<F>(
    reference: &IndexedTree,
    evaluation: &EvaluationTrees,
    config: &ScoringConfig,
    available_memory: F,
) -> Result<QuartetScores>
where
    F: FnOnce() -> u64,
{
    let taxa = TaxonMap::from_reference(reference)?;
    let node_taxa = taxa.reference_taxa(reference)?;
    info!(
        taxa = taxa.len(),
        evaluation_trees = evaluation.len(),
        bifurcating = reference.is_bifurcating(),
        "Scoring reference tree"
    );

    let strategy = MemoryEstimate::for_taxa(taxa.len(), available_memory).choose(config.low_memory)?;
    info!(?strategy, "Chose quartet lookup table");

    let pool = config.thread_pool()?;
    debug!(threads = pool.current_num_threads(), "Built worker pool");

    pool.install(|| {
        let t0 = Instant::now();
        let table = QuartetTable::build(strategy, &taxa, &evaluation.newicks, evaluation.translate.as_ref())?;
        info!(
            secs = t0.elapsed().as_secs_f64(),
            strategy = ?table.strategy(),
            bytes = table.memory_bytes(),
            "Counted quartet topologies"
        );

        let t1 = Instant::now();
        let scores = QuartetScoreComputer::new(reference, &node_taxa, &table).compute(config.mode)?;
        info!(secs = t1.elapsed().as_secs_f64(), mode = ?config.mode, "Computed quartet scores");
        Ok(scores)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnumerationMode;
    use crate::error::QuartetError;
    use crate::io::parse_evaluation_trees;

    const REFERENCE: &str = "((A,B),(C,(D,E)),(F,G));";

    fn reference() -> IndexedTree {
        IndexedTree::from_newick(REFERENCE).unwrap()
    }

    #[test]
    fn test_fails_fast_on_tiny_memory() {
        // unparseable evaluation trees: reaching the counting phase would
        // surface a Newick error instead
        let evaluation = EvaluationTrees { newicks: vec!["((((".to_string()], translate: None };
        let result = score_trees(&reference(), &evaluation, &ScoringConfig::default(), || 16);
        assert!(matches!(result, Err(QuartetError::InsufficientMemory { available: 16, .. })));
    }

    #[test]
    fn test_dense_and_sparse_runs_agree() {
        let evaluation = parse_evaluation_trees(
            "((A,B),(C,(D,E)),(F,G));\n((A,C),(B,(D,E)),(F,G));\n((A,B),(C,(D,F)),(E,G));\n",
            0,
        );
        let reference = reference();
        let config = ScoringConfig::default().with_threads(2);
        let dense = score_trees(&reference, &evaluation, &config, || u64::MAX).unwrap();
        let sparse =
            score_trees(&reference, &evaluation, &config.clone().with_low_memory(true), || u64::MAX).unwrap();
        assert_eq!(dense, sparse);

        let by_quartets = score_trees(
            &reference,
            &evaluation,
            &config.with_mode(EnumerationMode::Quartets),
            || u64::MAX,
        )
        .unwrap();
        for (a, b) in dense.lq_ic_scores().iter().zip(by_quartets.lq_ic_scores()) {
            assert!(a == b || (a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_unknown_taxon_in_evaluation_trees() {
        let evaluation = parse_evaluation_trees("((A,B),(C,(D,X)),(F,G));", 0);
        let result = score_trees(&reference(), &evaluation, &ScoringConfig::default(), || u64::MAX);
        assert!(matches!(result, Err(QuartetError::UnknownTaxon(name)) if name == "X"));
    }

    #[test]
    fn test_parse_error_reports_tree_index() {
        let evaluation = EvaluationTrees {
            newicks: vec![REFERENCE.to_string(), "((A,B),(C".to_string()],
            translate: None,
        };
        let result = score_trees(&reference(), &evaluation, &ScoringConfig::default(), || u64::MAX);
        assert!(matches!(result, Err(QuartetError::Newick { index: 1, .. })));
    }
}
