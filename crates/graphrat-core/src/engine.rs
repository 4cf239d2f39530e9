//! Census, neighbor sampling, and the update disciplines.
//!
//! One step runs `ceil(nrat / batch)` batches. Every batch starts with a
//! census on the coordinator, whose cumulative weights are broadcast before
//! any rat samples; commits apply only to a worker's owned node range, and a
//! gather restores the coordinator's full counts before the next census.
//! Everything a rat samples against (`gsums`, its own position, its own RNG)
//! is identical on every worker, which is what makes the snapshot stream
//! independent of the worker count.

use crate::error::SimError;
use crate::graph::Graph;
use crate::rng::RatRng;
use crate::snapshot::SnapshotSink;
use crate::state::Population;
use crate::weight::WeightTable;
use crate::{SimConfig, StepSummary};
use graphrat_transport::Transport;
use graphrat_transport::partition::PartitionPlan;
use rayon::prelude::*;
use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, info};

/// Rank that runs the census and owns the snapshot stream.
const COORDINATOR: usize = 0;

/// Blocks at most this long are scanned; longer blocks binary-search.
const LINEAR_SEARCH_MAX: usize = 16;

/// Batches below this size are not worth fanning out to rayon.
const PAR_SAMPLE_MIN: usize = 4096;

/// Rebuild the cumulative-weight arena from current counts.
///
/// Pass one parks each node's own weight in its self-edge slot; pass two
/// turns every block into a prefix sum over its destinations' weights. The
/// first slot a block rewrites is its own self slot, and the value written
/// there equals the weight already parked, so later blocks always read valid
/// self slots regardless of node order.
pub fn take_census(graph: &Graph, counts: &[u32], weights: &WeightTable, gsums: &mut [f64]) {
    let starts = graph.neighbor_start();
    let neighbors = graph.neighbors();
    for node in 0..graph.nnode() {
        gsums[starts[node]] = weights.get(counts[node]);
    }
    for node in 0..graph.nnode() {
        let mut sum = 0.0;
        for eid in starts[node]..starts[node + 1] {
            sum += gsums[starts[neighbors[eid] as usize]];
            gsums[eid] = sum;
        }
    }
}

/// Sample the next node for a rat sitting at `node`.
///
/// Draws a uniform value below the block's total weight and returns the
/// destination at the first slot whose cumulative weight exceeds it.
pub fn next_random_move(graph: &Graph, gsums: &[f64], node: u32, rng: &mut RatRng) -> u32 {
    let block = graph.block(node);
    let total = gsums[block.end - 1];
    let val = rng.next_f64(total);
    graph.neighbors()[weighted_slot(gsums, block, val)]
}

/// First slot in `block` with `gsums[slot] > val`, clamped to the final
/// slot. Short blocks scan from whichever end is closer to `val`.
fn weighted_slot(gsums: &[f64], block: Range<usize>, val: f64) -> usize {
    let (lo, hi) = (block.start, block.end);
    if hi - lo <= LINEAR_SEARCH_MAX {
        if val > gsums[hi - 1] / 2.0 {
            let mut eid = hi - 1;
            while eid > lo && gsums[eid - 1] > val {
                eid -= 1;
            }
            eid
        } else {
            let mut eid = lo;
            while eid + 1 < hi && gsums[eid] <= val {
                eid += 1;
            }
            eid
        }
    } else {
        let mut low = lo;
        let mut high = hi;
        while low < high {
            let mid = low + (high - low) / 2;
            if gsums[mid] > val {
                high = mid;
            } else {
                low = mid + 1;
            }
        }
        low.min(hi - 1)
    }
}

/// Per-worker simulation driver.
///
/// Every worker of a run constructs its own `Simulator` over the shared
/// graph and an identical population, then calls [`run`](Self::run); the
/// collective schedule keeps them in lockstep. A single-worker run uses
/// [`LocalTransport`](graphrat_transport::LocalTransport), where every
/// collective degenerates to a copy.
pub struct Simulator<T: Transport> {
    graph: Arc<Graph>,
    config: SimConfig,
    population: Population,
    weights: WeightTable,
    gsums: Vec<f64>,
    plan: PartitionPlan,
    transport: T,
    step: u64,
    history: VecDeque<StepSummary>,
}

impl<T: Transport> Simulator<T> {
    /// Wire up a worker. Fails if the configuration is unusable or the
    /// lattice cannot be split across this transport's worker count.
    pub fn new(
        graph: Arc<Graph>,
        population: Population,
        config: SimConfig,
        transport: T,
    ) -> Result<Self, SimError> {
        config.validate()?;
        let plan = PartitionPlan::new(
            graph.nrow(),
            graph.tile_size(),
            population.len(),
            transport.size(),
        )?;
        let weights = WeightTable::build(population.len(), graph.nnode());
        let gsums = vec![0.0; graph.arena_len()];
        let history = VecDeque::with_capacity(config.history_capacity);
        Ok(Self {
            graph,
            config,
            population,
            weights,
            gsums,
            plan,
            transport,
            step: 0,
            history,
        })
    }

    /// Drive the configured number of steps.
    ///
    /// The coordinator emits the initial snapshot, one per due step, and the
    /// terminal marker; other workers' sinks are never called.
    pub fn run(&mut self, sink: &mut dyn SnapshotSink) -> Result<(), SimError> {
        let steps = self.config.steps;
        if self.is_coordinator() {
            info!(
                steps,
                rats = self.population.len(),
                mode = self.config.mode.label(),
                workers = self.transport.size(),
                "starting simulation"
            );
            self.emit_snapshot(sink)?;
        }
        for step in 0..steps {
            let summary = self.run_step()?;
            debug!(step = summary.step, moved = summary.moved, "step complete");
            self.push_history(summary);
            if self.is_coordinator() && self.snapshot_due(step) {
                self.emit_snapshot(sink)?;
            }
            self.transport.barrier()?;
        }
        if self.is_coordinator() {
            sink.done().map_err(SimError::Snapshot)?;
        }
        Ok(())
    }

    /// Advance the simulation by one step.
    pub fn run_step(&mut self) -> Result<StepSummary, SimError> {
        let nrat = self.population.len();
        let batch = self.config.mode.batch_size(nrat);
        let mut moved = 0;
        let mut start = 0;
        while start < nrat {
            let count = batch.min(nrat - start);
            if self.is_coordinator() {
                take_census(
                    &self.graph,
                    self.population.counts(),
                    &self.weights,
                    &mut self.gsums,
                );
            }
            self.transport.broadcast(&mut self.gsums, COORDINATOR)?;
            if count == nrat {
                self.sample_partitioned()?;
            } else {
                // Small batches are sampled redundantly by every worker;
                // per-rat RNG keeps the replicas identical, so no exchange
                // is needed before commit.
                self.sample_range(start..start + count);
            }
            moved += self.commit(start, start + count);
            self.gather_counts()?;
            start += count;
        }
        self.step += 1;
        Ok(StepSummary {
            step: self.step,
            moved,
        })
    }

    /// Whole-population batch: each worker samples only its agent range,
    /// then the ranges are exchanged so every worker can commit the batch.
    fn sample_partitioned(&mut self) -> Result<(), SimError> {
        let range = self.plan.agent_range(self.transport.rank());
        self.sample_range(range.clone());
        if self.transport.size() > 1 {
            let mine = self.population.next_position[range].to_vec();
            self.transport.all_gather(
                &mine,
                &mut self.population.next_position,
                self.plan.agent_displacements(),
            )?;
        }
        Ok(())
    }

    fn sample_range(&mut self, range: Range<usize>) {
        let graph = self.graph.as_ref();
        let gsums = self.gsums.as_slice();
        let positions = self.population.position.as_slice();
        let start = range.start;
        let next = &mut self.population.next_position[range.clone()];
        let seeds = &mut self.population.seeds[range];
        if next.len() >= PAR_SAMPLE_MIN {
            next.par_iter_mut()
                .zip(seeds.par_iter_mut())
                .enumerate()
                .for_each(|(offset, (slot, rng))| {
                    *slot = next_random_move(graph, gsums, positions[start + offset], rng);
                });
        } else {
            for (offset, (slot, rng)) in next.iter_mut().zip(seeds.iter_mut()).enumerate() {
                *slot = next_random_move(graph, gsums, positions[start + offset], rng);
            }
        }
    }

    /// Apply the batch's moves in ascending rat order, updating counts only
    /// on this worker's owned node range. Returns how many rats moved.
    fn commit(&mut self, start: usize, end: usize) -> usize {
        let owned = self.plan.node_range(self.transport.rank());
        let mut moved = 0;
        for rat in start..end {
            let from = self.population.position[rat];
            let to = self.population.next_position[rat];
            if from != to {
                moved += 1;
            }
            if owned.contains(&(from as usize)) {
                self.population.rat_count[from as usize] -= 1;
            }
            if owned.contains(&(to as usize)) {
                self.population.rat_count[to as usize] += 1;
            }
            self.population.position[rat] = to;
        }
        moved
    }

    /// Reassemble the coordinator's full counts from every worker's owned
    /// slice.
    fn gather_counts(&mut self) -> Result<(), SimError> {
        if self.transport.size() == 1 {
            return Ok(());
        }
        let owned = self.plan.node_range(self.transport.rank());
        let mine = self.population.rat_count[owned].to_vec();
        let recv = self
            .is_coordinator()
            .then_some(&mut self.population.rat_count[..]);
        self.transport.gather(
            &mine,
            recv,
            self.plan.node_displacements(),
            COORDINATOR,
        )?;
        Ok(())
    }

    fn emit_snapshot(&self, sink: &mut dyn SnapshotSink) -> Result<(), SimError> {
        sink.snapshot(
            self.graph.nnode(),
            self.population.len(),
            self.population.counts(),
        )
        .map_err(SimError::Snapshot)
    }

    fn snapshot_due(&self, step: u64) -> bool {
        (step + 1).is_multiple_of(self.config.snapshot_interval) || step + 1 == self.config.steps
    }

    fn push_history(&mut self, summary: StepSummary) {
        if self.config.history_capacity == 0 {
            return;
        }
        if self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(summary);
    }

    fn is_coordinator(&self) -> bool {
        self.transport.rank() == COORDINATOR
    }

    /// Steps completed so far.
    #[must_use]
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Immutable view of the population.
    #[must_use]
    pub fn population(&self) -> &Population {
        &self.population
    }

    /// Immutable view of the graph.
    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Retained per-step summaries, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &StepSummary> {
        self.history.iter()
    }
}
