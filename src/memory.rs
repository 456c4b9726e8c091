//! Memory planning for the quartet lookup table.
//!
//! Counting topologies needs one counter per quartet topology. Two layouts
//! are available:
//!
//! | Strategy | Slots            | Lookup            |
//! |----------|------------------|-------------------|
//! | Dense    | n^4              | direct indexing   |
//! | Sparse   | C(n, 4) * 3      | quartet rank      |
//!
//! The plan is made before any table is allocated. If even the sparse
//! estimate exceeds the available memory, the run fails right away instead
//! of running out of memory hours into counting.

use crate::error::{QuartetError, Result};
use crate::lookup::Count;
use tracing::{info, warn};

/// Layout of the quartet lookup table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LookupStrategy {
    Dense,
    Sparse,
}

/// Projected memory use of both table layouts against what is available.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemoryEstimate {
    pub dense_bytes: u128,
    pub sparse_bytes: u128,
    pub available_bytes: u64,
}

impl MemoryEstimate {
    /// Estimate table sizes for `num_taxa` taxa, asking `available_memory`
    /// for the memory that may be used.
    pub fn for_taxa<F>(num_taxa: usize, available_memory: F) -> Self
    where
        F: FnOnce() -> u64,
    {
        let n = num_taxa as u128;
        let count_bytes = std::mem::size_of::<Count>() as u128;
        let quartets = if n < 4 { 0 } else { n * (n - 1) * (n - 2) * (n - 3) / 24 };

        MemoryEstimate {
            dense_bytes: n * n * n * n * count_bytes,
            sparse_bytes: quartets * 3 * count_bytes,
            available_bytes: available_memory(),
        }
    }

    /// Pick the table layout.
    ///
    /// The dense table is used when it fits and `prefer_sparse` is not set.
    ///
    /// # Errors
    /// `InsufficientMemory` if not even the sparse table fits.
    pub fn choose(&self, prefer_sparse: bool) -> Result<LookupStrategy> {
        info!(
            dense_bytes = %self.dense_bytes,
            sparse_bytes = %self.sparse_bytes,
            available_bytes = self.available_bytes,
            "Estimated quartet lookup memory"
        );

        let available = self.available_bytes as u128;
        if self.sparse_bytes > available {
            return Err(QuartetError::InsufficientMemory {
                required: self.sparse_bytes,
                available: self.available_bytes,
            });
        }
        if !prefer_sparse && self.dense_bytes <= available {
            Ok(LookupStrategy::Dense)
        } else {
            Ok(LookupStrategy::Sparse)
        }
    }
}

/// Total physical memory of the machine, or `None` if it cannot be queried.
pub fn total_system_memory() -> Option<u64> {
    #[cfg(unix)]
    {
        // SAFETY: sysconf has no preconditions for these names.
        let pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
        // SAFETY: as above.
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) };
        (pages > 0 && page_size > 0).then(|| (pages as u64).saturating_mul(page_size as u64))
    }
    #[cfg(not(unix))]
    {
        None
    }
}

/// [`total_system_memory`], or unlimited with a warning when the query fails.
///
/// Without a known limit the fail-fast check never rejects a run.
pub fn available_memory_or_unlimited() -> u64 {
    total_system_memory().unwrap_or_else(|| {
        warn!("Failed to query physical memory; memory check disabled");
        u64::MAX
    })
}
