//! Run configuration shared by the CLI, the Python binding and library callers.

use crate::error::Result;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Entry point used to enumerate a bifurcating reference tree.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum EnumerationMode {
    /// One work unit per pair of inner nodes, scoring a whole metaquartet at once.
    #[default]
    NodePairs,
    /// One work unit per quartet, each resolved on its own.
    Quartets,
}

#[derive(Clone, Debug, Default)]
pub struct ScoringConfig {
    /// Worker threads; 0 uses rayon's default (one per core).
    pub threads: usize,
    /// Use the sparse lookup table even when the dense one would fit.
    pub low_memory: bool,
    pub mode: EnumerationMode,
}

impl ScoringConfig {
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_low_memory(mut self, low_memory: bool) -> Self {
        self.low_memory = low_memory;
        self
    }

    pub fn with_mode(mut self, mode: EnumerationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Build the worker pool every parallel phase of a run is installed on.
    pub fn thread_pool(&self) -> Result<ThreadPool> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|i| format!("quartet-worker-{i}"))
            .build()?;
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScoringConfig::default();
        assert_eq!(config.threads, 0);
        assert!(!config.low_memory);
        assert_eq!(config.mode, EnumerationMode::NodePairs);
    }

    #[test]
    fn test_pool_size() {
        let pool = ScoringConfig::default().with_threads(3).thread_pool().unwrap();
        assert_eq!(pool.current_num_threads(), 3);
        assert_eq!(pool.install(rayon::current_num_threads), 3);
    }
}
