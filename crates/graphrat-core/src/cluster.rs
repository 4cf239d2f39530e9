//! SPMD launcher: one simulation, many in-process workers.
//!
//! Worker 0 runs on the calling thread and owns the snapshot sink; the
//! remaining workers run on scoped threads with a null sink. Only the
//! coordinator needs the loaded population up front: a bootstrap broadcast
//! hands every other worker the initial positions, from which each derives
//! identical seeds and counts locally.

use crate::engine::Simulator;
use crate::error::SimError;
use crate::graph::Graph;
use crate::snapshot::{NullSink, SnapshotSink};
use crate::state::Population;
use crate::SimConfig;
use graphrat_transport::channel::ChannelTransport;
use graphrat_transport::{LocalTransport, Transport};
use std::sync::Arc;
use std::thread;
use tracing::debug;

/// Run the configured simulation across `workers` cooperating workers.
///
/// The snapshot stream is bit-identical for every worker count; `workers`
/// must not exceed the graph's strip count or the population size.
pub fn run_cluster(
    graph: Arc<Graph>,
    population: Population,
    config: SimConfig,
    workers: usize,
    sink: &mut dyn SnapshotSink,
) -> Result<(), SimError> {
    if workers <= 1 {
        let mut sim = Simulator::new(graph, population, config, LocalTransport)?;
        return sim.run(sink);
    }

    let mut endpoints = ChannelTransport::hub(workers);
    let coordinator = endpoints.remove(0);
    let seed = config.global_seed;
    debug!(workers, "launching worker threads");
    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers - 1);
        for transport in endpoints {
            let graph = Arc::clone(&graph);
            let config = config.clone();
            handles.push(scope.spawn(move || -> Result<(), SimError> {
                let population = bootstrap(&transport, &graph, None, seed)?;
                let mut sim = Simulator::new(graph, population, config, transport)?;
                sim.run(&mut NullSink)
            }));
        }

        let population = bootstrap(&coordinator, &graph, Some(population), seed)?;
        let mut sim = Simulator::new(Arc::clone(&graph), population, config, coordinator)?;
        let result = sim.run(sink);

        let mut first_failure = None;
        for (index, handle) in handles.into_iter().enumerate() {
            let rank = index + 1;
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    first_failure.get_or_insert(SimError::WorkerFailed {
                        rank,
                        message: err.to_string(),
                    });
                }
                Err(_) => {
                    first_failure.get_or_insert(SimError::WorkerFailed {
                        rank,
                        message: "worker thread panicked".to_owned(),
                    });
                }
            }
        }
        // The coordinator's own failure is the most direct report.
        match result {
            Err(err) => Err(err),
            Ok(()) => first_failure.map_or(Ok(()), Err),
        }
    })
}

/// Replicate the coordinator's initial positions and rebuild identical
/// population state on every worker.
fn bootstrap<T: Transport>(
    transport: &T,
    graph: &Graph,
    population: Option<Population>,
    seed: u64,
) -> Result<Population, SimError> {
    let mut header = [0u64; 1];
    if let Some(population) = &population {
        header[0] = population.len() as u64;
    }
    transport.broadcast(&mut header, 0)?;
    let nrat = usize::try_from(header[0])
        .map_err(|_| SimError::InvalidConfig("population too large for this platform"))?;

    let mut positions = match population {
        Some(population) => population.positions().to_vec(),
        None => vec![0u32; nrat],
    };
    transport.broadcast(&mut positions, 0)?;
    Ok(Population::from_positions(graph, positions, seed)?)
}
