//! Strip and agent partitioning across workers.
//!
//! Node ownership follows the lattice's horizontal strips: the row-major
//! numbering makes each strip of `tile_size` rows a contiguous node range, so
//! assigning whole strips to workers keeps every owned range contiguous.
//! Agents are split independently by the same balanced rule on their index
//! space.

use std::ops::Range;
use thiserror::Error;

/// Errors raised while building a partition plan.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PartitionError {
    #[error("worker count must be at least 1")]
    NoWorkers,
    #[error("{workers} workers cannot share {tiles} strips")]
    TooManyWorkers { workers: usize, tiles: usize },
    #[error("{workers} workers cannot share {agents} agents")]
    TooFewAgents { workers: usize, agents: usize },
}

/// Balanced contiguous split of `total` items into `parts` ranges, returned
/// as `parts + 1` displacements. The first `total % parts` ranges take one
/// extra item.
#[must_use]
pub fn balanced_displacements(total: usize, parts: usize) -> Vec<usize> {
    let base = total / parts;
    let extra = total % parts;
    let mut displs = Vec::with_capacity(parts + 1);
    let mut at = 0;
    displs.push(at);
    for p in 0..parts {
        at += base + usize::from(p < extra);
        displs.push(at);
    }
    displs
}

/// Node and agent ownership for one SPMD run.
///
/// Both displacement vectors are strictly increasing with
/// `ndisp[0] == rdisp[0] == 0`, `ndisp[P] == nnode` and `rdisp[P] == nrat`,
/// so every node and agent has exactly one owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    ndisp: Vec<usize>,
    rdisp: Vec<usize>,
}

impl PartitionPlan {
    /// Split an `nrow x nrow` lattice (strips of `tile_size` rows) and
    /// `nrat` agents across `workers`.
    pub fn new(
        nrow: usize,
        tile_size: usize,
        nrat: usize,
        workers: usize,
    ) -> Result<Self, PartitionError> {
        if workers == 0 {
            return Err(PartitionError::NoWorkers);
        }
        let tile_size = tile_size.clamp(1, nrow.max(1));
        let tiles = nrow.div_ceil(tile_size).max(1);
        if workers > tiles {
            return Err(PartitionError::TooManyWorkers { workers, tiles });
        }
        if workers > nrat {
            return Err(PartitionError::TooFewAgents {
                workers,
                agents: nrat,
            });
        }

        // Whole strips per worker; a strip boundary is always a row boundary.
        let tdisp = balanced_displacements(tiles, workers);
        let ndisp = tdisp
            .iter()
            .map(|&t| (t * tile_size).min(nrow) * nrow)
            .collect();
        let rdisp = balanced_displacements(nrat, workers);
        Ok(Self { ndisp, rdisp })
    }

    /// Number of workers this plan was built for.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.ndisp.len() - 1
    }

    /// Node range owned by `rank`.
    #[must_use]
    pub fn node_range(&self, rank: usize) -> Range<usize> {
        self.ndisp[rank]..self.ndisp[rank + 1]
    }

    /// Agent range sampled by `rank`.
    #[must_use]
    pub fn agent_range(&self, rank: usize) -> Range<usize> {
        self.rdisp[rank]..self.rdisp[rank + 1]
    }

    /// Node displacements, one entry per worker plus the terminal `nnode`.
    #[must_use]
    pub fn node_displacements(&self) -> &[usize] {
        &self.ndisp
    }

    /// Agent displacements, one entry per worker plus the terminal `nrat`.
    #[must_use]
    pub fn agent_displacements(&self) -> &[usize] {
        &self.rdisp
    }
}
