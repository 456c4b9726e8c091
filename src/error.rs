//! Error type shared by every stage of a scoring run.
//!
//! None of these are retried: any error terminates the whole run. Internal
//! invariant violations in topology classification are panics, not values
//! of this type (see [`crate::quartet::Topology::classify`]).

use phylotree::tree::TreeError;

/// Failure of a quartet scoring run.
#[derive(thiserror::Error, Debug)]
pub enum QuartetError {
    /// The projected quartet lookup table does not fit into available memory.
    #[error("Insufficient memory: quartet lookup needs {required} bytes, {available} bytes available")]
    InsufficientMemory { required: u128, available: u64 },

    /// A taxon of a quartet was not found in the leaf range of the subtree it must belong to.
    #[error("None of the taxa {quartet:?} found in the subtree of link {link}")]
    LeafNotInSubtree { link: usize, quartet: [usize; 4] },

    #[error("Tree error: {0}")]
    Tree(String),

    #[error("Failed to parse tree {index}: {message}")]
    Newick { index: usize, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Taxon '{0}' does not occur in the reference tree")]
    UnknownTaxon(String),

    #[error("Taxon '{0}' occurs more than once in a tree")]
    DuplicateTaxon(String),

    #[error("Tree contains a leaf without a name")]
    UnnamedLeaf,

    #[error("Tree has {count} taxa, at most {max} are supported")]
    TooManyTaxa { count: usize, max: usize },

    #[error("Tree has {0} taxa, at least 3 are required")]
    TooFewTaxa(usize),

    #[error("No evaluation trees to count quartets from")]
    NoEvaluationTrees,

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl From<TreeError> for QuartetError {
    fn from(e: TreeError) -> Self {
        QuartetError::Tree(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, QuartetError>;
