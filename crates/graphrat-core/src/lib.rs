//! Core engine for weighted random walks of an agent population ("rats")
//! over a lattice graph.
//!
//! Each step, every rat picks a neighbor of its current node (or stays put
//! via the self-edge) with probability proportional to an occupancy-dependent
//! weight. The engine guarantees numerically reproducible trajectories for a
//! given seed, offers three update disciplines trading parallelism against
//! staleness, and runs unchanged on one worker or a partitioned group with
//! bit-identical results.

pub mod cluster;
pub mod engine;
pub mod error;
pub mod graph;
pub mod rng;
pub mod snapshot;
pub mod state;
pub mod weight;

pub use engine::{Simulator, next_random_move, take_census};
pub use error::{GraphLoadError, RatLoadError, SimError};
pub use graph::Graph;
pub use snapshot::{NullSink, SnapshotSink, StreamSink};
pub use state::Population;
pub use weight::WeightTable;

use serde::{Deserialize, Serialize};

/// Global seed used when the caller does not provide one.
pub const DEFAULT_SEED: u64 = 418;

/// Batch size of the batched discipline, as a fraction of the population.
const BATCH_FRACTION: f64 = 0.02;

/// When counts are re-read relative to commits.
///
/// All disciplines share the same step loop and differ only in batch size:
/// a census runs before every batch, so smaller batches see fresher counts
/// at the cost of less parallel work per census.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum UpdateMode {
    /// One batch spanning the whole population; every rat samples against
    /// the counts from the start of the step.
    Synchronous,
    /// Batch of one: counts refresh before each rat moves.
    RatOrder,
    /// Small batches; counts refresh between batches.
    #[default]
    Batched,
}

impl UpdateMode {
    /// Number of rats sampled between censuses under this discipline.
    #[must_use]
    pub fn batch_size(self, nrat: usize) -> usize {
        match self {
            Self::Synchronous => nrat.max(1),
            Self::RatOrder => 1,
            Self::Batched => {
                #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let fraction = (BATCH_FRACTION * nrat as f64) as usize;
                #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let root = (nrat as f64).sqrt() as usize;
                fraction.max(root).max(1)
            }
        }
    }

    /// Short name used in logs.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Synchronous => "synchronous",
            Self::RatOrder => "rat",
            Self::Batched => "batch",
        }
    }
}

/// Run-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Seed combined with each agent index to derive per-agent streams.
    pub global_seed: u64,
    /// Update discipline.
    pub mode: UpdateMode,
    /// Number of simulation steps.
    pub steps: u64,
    /// Emit a snapshot every this many steps (and on the final step).
    pub snapshot_interval: u64,
    /// Bound on retained per-step summaries.
    pub history_capacity: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            global_seed: DEFAULT_SEED,
            mode: UpdateMode::default(),
            steps: 1,
            snapshot_interval: 1,
            history_capacity: 128,
        }
    }
}

impl SimConfig {
    /// Reject values the step loop cannot honor.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.snapshot_interval == 0 {
            return Err(SimError::InvalidConfig(
                "snapshot interval must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Outcome of one simulation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSummary {
    /// 1-based step index.
    pub step: u64,
    /// Rats that changed node this step.
    pub moved: usize,
}
