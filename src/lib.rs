//! Crate root: module orchestration and public re-exports.
//!
//! Modules:
//! - `quartet`: canonical 64-bit keys for quartet topologies.
//! - `tree`: indexed arena over an unrooted tree (LCA, paths, Euler tour leaf ranges).
//! - `taxa`: taxon numbering shared by reference and evaluation trees.
//! - `lookup`: topology occurrence counts over the evaluation trees.
//! - `memory`: dense vs sparse lookup table planning.
//! - `scores`: information content and per-edge aggregation.
//! - `metaquartet`: quartet enumeration over the reference tree.
//! - `pipeline`: end-to-end scoring run.
//! - `io`: reading Newick/NEXUS trees and writing scores.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod config;
pub mod error;
pub mod io;
pub mod lookup;
pub mod memory;
pub mod metaquartet;
pub mod pipeline;
pub mod quartet;
pub mod scores;
pub mod taxa;
pub mod tree;

#[cfg(feature = "python")]
pub mod api;

// Re-export frequently used types & functions
pub use config::{EnumerationMode, ScoringConfig};
pub use error::{QuartetError, Result};
pub use io::{read_evaluation_trees, read_reference_tree};
pub use lookup::{QuartetTable, TopologyCounts};
pub use metaquartet::QuartetScoreComputer;
pub use pipeline::score_trees;
pub use scores::{QuartetScores, log_score};
pub use tree::IndexedTree;
