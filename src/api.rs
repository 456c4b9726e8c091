//! Python binding layer for quartet-based branch support.
//!
//! Provides a Python function scoring the edges of a reference tree
//! against a file of evaluation trees.

use pyo3::exceptions::{PyMemoryError, PyValueError};
use pyo3::prelude::*;

use crate::config::ScoringConfig;
use crate::error::QuartetError;
use crate::io::{read_evaluation_trees, read_reference_tree};
use crate::memory::available_memory_or_unlimited;
use crate::pipeline::score_trees;

fn to_py_err(e: QuartetError) -> PyErr {
    match e {
        QuartetError::InsufficientMemory { .. } => PyMemoryError::new_err(e.to_string()),
        other => PyValueError::new_err(other.to_string()),
    }
}

/// Compute LQ-IC, QP-IC and EQP-IC for every edge of a reference tree.
///
/// Args:
///     reference_path: Newick or NEXUS file holding the reference tree
///     evaluation_path: Newick or NEXUS/BEAST file of evaluation trees (.gz allowed)
///     threads: Worker threads, 0 for one per core (default: 0)
///     low_memory: Use the sparse lookup table even if the dense one fits (default: False)
///
/// Returns:
///     A tuple of (lq_ic, qp_ic, eqp_ic), each a list with one score per
///     reference edge. Edges without any informative quartet score `inf`;
///     qp_ic and eqp_ic are all `inf` for a multifurcating reference tree.
///
/// Raises:
///     MemoryError: If the quartet lookup table cannot fit into memory
///     ValueError: If a tree cannot be read or the taxa do not match
#[pyfunction]
#[pyo3(signature = (reference_path, evaluation_path, threads=0, low_memory=false))]
fn quartet_scores(
    py: Python<'_>,
    reference_path: String,
    evaluation_path: String,
    threads: usize,
    low_memory: bool,
) -> PyResult<(Vec<f64>, Vec<f64>, Vec<f64>)> {
    let reference = read_reference_tree(&reference_path).map_err(to_py_err)?;
    let evaluation = read_evaluation_trees(&evaluation_path, 0).map_err(to_py_err)?;
    let config = ScoringConfig::default().with_threads(threads).with_low_memory(low_memory);

    let scores = py
        .detach(|| score_trees(&reference, &evaluation, &config, available_memory_or_unlimited))
        .map_err(to_py_err)?;
    Ok(scores.into_vecs())
}

/// Python module definition
#[pymodule]
#[pyo3(name = "quartet_scores")]
fn python_module(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(quartet_scores, m)?)?;
    Ok(())
}
