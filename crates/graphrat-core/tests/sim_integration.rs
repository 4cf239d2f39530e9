//! End-to-end scenarios: engine output versus first-principles replays,
//! snapshot cadence, and worker-count invariance.

use graphrat_core::cluster::run_cluster;
use graphrat_core::rng::RatRng;
use graphrat_core::{
    Graph, NullSink, Population, SimConfig, Simulator, StreamSink, UpdateMode, next_random_move,
    take_census, WeightTable,
};
use graphrat_transport::LocalTransport;
use std::sync::Arc;

/// Step the population by hand with the public census/sampler primitives:
/// census before every batch, sample in ascending rat order, commit.
fn manual_replay(
    graph: &Graph,
    mut positions: Vec<u32>,
    seed: u64,
    steps: usize,
    batch: usize,
) -> Vec<u32> {
    let nrat = positions.len();
    let mut counts = vec![0u32; graph.nnode()];
    for &node in &positions {
        counts[node as usize] += 1;
    }
    let weights = WeightTable::build(nrat, graph.nnode());
    let mut gsums = vec![0.0; graph.arena_len()];
    let mut rngs: Vec<RatRng> = (0..nrat).map(|rat| RatRng::for_agent(seed, rat)).collect();
    let mut next = vec![0u32; nrat];
    for _ in 0..steps {
        let mut start = 0;
        while start < nrat {
            let count = batch.min(nrat - start);
            take_census(graph, &counts, &weights, &mut gsums);
            for rat in start..start + count {
                next[rat] = next_random_move(graph, &gsums, positions[rat], &mut rngs[rat]);
            }
            for rat in start..start + count {
                counts[positions[rat] as usize] -= 1;
                counts[next[rat] as usize] += 1;
                positions[rat] = next[rat];
            }
            start += count;
        }
    }
    counts
}

fn run_counts(
    graph: &Arc<Graph>,
    positions: Vec<u32>,
    seed: u64,
    steps: u64,
    mode: UpdateMode,
) -> Vec<u32> {
    let population = Population::from_positions(graph, positions, seed).expect("population");
    let config = SimConfig {
        global_seed: seed,
        mode,
        steps,
        ..SimConfig::default()
    };
    let mut sim =
        Simulator::new(Arc::clone(graph), population, config, LocalTransport).expect("simulator");
    sim.run(&mut NullSink).expect("run");
    sim.population().counts().to_vec()
}

fn run_stream(
    graph: &Arc<Graph>,
    positions: Vec<u32>,
    config: SimConfig,
    workers: usize,
) -> Vec<u8> {
    let population =
        Population::from_positions(graph, positions, config.global_seed).expect("population");
    let mut sink = StreamSink::new(Vec::new());
    run_cluster(Arc::clone(graph), population, config, workers, &mut sink).expect("cluster run");
    sink.into_inner()
}

/// Split a snapshot stream into count frames, checking framing as we go.
fn parse_frames(stream: &[u8]) -> Vec<Vec<u32>> {
    let text = std::str::from_utf8(stream).expect("utf8 stream");
    let mut lines = text.lines();
    let mut frames = Vec::new();
    loop {
        match lines.next() {
            Some("DONE") => {
                assert!(lines.next().is_none(), "DONE must be the final line");
                return frames;
            }
            Some(header) => {
                let mut fields = header.split_whitespace();
                assert_eq!(fields.next(), Some("STEP"));
                let nnode: usize = fields.next().expect("nnode").parse().expect("nnode");
                let counts: Vec<u32> = (0..nnode)
                    .map(|_| lines.next().expect("count line").parse().expect("count"))
                    .collect();
                assert_eq!(lines.next(), Some("END"));
                frames.push(counts);
            }
            None => panic!("stream ended without DONE"),
        }
    }
}

#[test]
fn synchronous_step_matches_a_first_principles_replay() {
    // 2x2 lattice, every rat starting on node 0, a single synchronous step.
    let graph = Arc::new(Graph::lattice(2, 0));
    let start = vec![0u32; 4];
    let expected = manual_replay(&graph, start.clone(), 1, 1, 4);
    let actual = run_counts(&graph, start, 1, 1, UpdateMode::Synchronous);
    assert_eq!(actual, expected);
    assert_eq!(expected.iter().sum::<u32>(), 4);
}

#[test]
fn rat_order_walk_matches_a_batch_of_one_replay() {
    let graph = Arc::new(Graph::lattice(2, 0));
    let start = vec![0u32; 4];
    let expected = manual_replay(&graph, start.clone(), 1, 10, 1);
    let actual = run_counts(&graph, start, 1, 10, UpdateMode::RatOrder);
    assert_eq!(actual, expected);
}

#[test]
fn batched_walk_matches_its_replay() {
    let graph = Arc::new(Graph::lattice(4, 1));
    let start: Vec<u32> = (0..32).map(|rat| rat % 16).collect();
    let batch = UpdateMode::Batched.batch_size(32);
    let expected = manual_replay(&graph, start.clone(), 7, 5, batch);
    let actual = run_counts(&graph, start, 7, 5, UpdateMode::Batched);
    assert_eq!(actual, expected);
}

#[test]
fn snapshot_cadence_follows_the_interval() {
    let graph = Arc::new(Graph::lattice(2, 0));
    let config = SimConfig {
        global_seed: 3,
        mode: UpdateMode::Batched,
        steps: 10,
        snapshot_interval: 3,
        ..SimConfig::default()
    };
    let stream = run_stream(&graph, vec![0, 1, 2, 3], config, 1);
    let frames = parse_frames(&stream);
    // Initial state plus steps 3, 6, 9, and the final step 10.
    assert_eq!(frames.len(), 5);
    for frame in &frames {
        assert_eq!(frame.len(), 4);
        assert_eq!(frame.iter().sum::<u32>(), 4);
    }
}

#[test]
fn snapshot_streams_are_identical_across_worker_counts() {
    let graph = Arc::new(Graph::lattice(4, 1));
    let start: Vec<u32> = (0..32).map(|rat| (rat * 3) % 16).collect();
    for mode in [
        UpdateMode::Synchronous,
        UpdateMode::RatOrder,
        UpdateMode::Batched,
    ] {
        let config = SimConfig {
            global_seed: 7,
            mode,
            steps: 5,
            ..SimConfig::default()
        };
        let solo = run_stream(&graph, start.clone(), config.clone(), 1);
        for workers in [2, 4] {
            let split = run_stream(&graph, start.clone(), config.clone(), workers);
            assert_eq!(
                solo,
                split,
                "{} diverged at {workers} workers",
                mode.label()
            );
        }
    }
}

#[test]
fn repeated_runs_emit_byte_identical_streams() {
    let graph = Arc::new(Graph::lattice(4, 1));
    let start: Vec<u32> = (0..32).map(|rat| rat % 16).collect();
    let config = SimConfig {
        global_seed: 7,
        mode: UpdateMode::Batched,
        steps: 5,
        snapshot_interval: 2,
        ..SimConfig::default()
    };
    let first = run_stream(&graph, start.clone(), config.clone(), 1);
    let second = run_stream(&graph, start, config, 1);
    assert_eq!(first, second);
}

#[test]
fn rats_on_an_isolated_graph_never_move() {
    let graph = Arc::new(Graph::from_reader("4 0\n".as_bytes()).expect("graph"));
    let config = SimConfig {
        global_seed: 1,
        steps: 1,
        ..SimConfig::default()
    };
    let stream = run_stream(&graph, vec![0; 5], config, 1);
    let frames = parse_frames(&stream);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0], vec![5, 0, 0, 0]);
    assert_eq!(frames[1], vec![5, 0, 0, 0]);
}

#[test]
fn every_block_starts_with_its_self_edge() {
    let graph = Graph::lattice(5, 2);
    for node in 0..graph.nnode() as u32 {
        let block = graph.block(node);
        assert_eq!(graph.neighbors()[block.start], node);
    }
}
