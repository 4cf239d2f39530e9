//! Error taxonomy for loading and running simulations.
//!
//! Every error here is terminal: loaders surface the first violation they
//! see and the run is abandoned. The engine inner loop relies on invariants
//! established at load time, so nothing in the step path returns a parse- or
//! range-style error.

use graphrat_transport::TransportError;
use graphrat_transport::partition::PartitionError;
use std::io;
use thiserror::Error;

/// Errors raised while reading a graph file.
#[derive(Debug, Error)]
pub enum GraphLoadError {
    #[error("couldn't read graph file: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed graph file header (line {line})")]
    MalformedHeader { line: usize },
    #[error("line {line} of graph file malformed")]
    MalformedEdge { line: usize },
    #[error("invalid head index {hid} on line {line}")]
    HeadOutOfRange { hid: usize, line: usize },
    #[error("invalid tail index {tid} on line {line}")]
    TailOutOfRange { tid: usize, line: usize },
    #[error("head index {hid} on line {line} out of order")]
    HeadOutOfOrder { hid: usize, line: usize },
    #[error("node count {nnode} is not a perfect square")]
    NotSquare { nnode: usize },
    #[error("graph file ended before {nedge} edges were read")]
    Truncated { nedge: usize },
    #[error("graph with {nnode} nodes and {nedge} edges exceeds addressable memory")]
    TooLarge { nnode: usize, nedge: usize },
}

/// Errors raised while reading a rat-position file or building a population.
#[derive(Debug, Error)]
pub enum RatLoadError {
    #[error("couldn't read rat file: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed rat file header (line {line})")]
    MalformedHeader { line: usize },
    #[error("graph contains {graph_nodes} nodes, but rat file has {file_nodes}")]
    SizeMismatch {
        graph_nodes: usize,
        file_nodes: usize,
    },
    #[error("rat file declares no rats")]
    EmptyPopulation,
    #[error("line {line} of rat file malformed")]
    MalformedLine { line: usize },
    #[error("invalid node number {node} on line {line}")]
    NodeOutOfRange { node: u32, line: usize },
    #[error("invalid node number {node} for rat {agent}")]
    PositionOutOfRange { agent: usize, node: u32 },
    #[error("rat file ended before {nrat} positions were read")]
    Truncated { nrat: usize },
}

/// Errors raised while configuring or running a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("invalid population: {0}")]
    Population(#[from] RatLoadError),
    #[error(transparent)]
    Partition(#[from] PartitionError),
    #[error("collective operation failed: {0}")]
    Collective(#[from] TransportError),
    #[error("snapshot output failed: {0}")]
    Snapshot(#[source] io::Error),
    #[error("worker {rank} failed: {message}")]
    WorkerFailed { rank: usize, message: String },
}
