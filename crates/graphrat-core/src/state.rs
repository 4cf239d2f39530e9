//! Mutable population state: rat positions, per-rat RNG streams, and the
//! per-node occupancy counts.
//!
//! All storage is plain parallel arrays indexed by rat or node id. The
//! `next_position` column is scratch: it only carries values between the
//! sample and commit phases of one batch.

use crate::error::RatLoadError;
use crate::graph::{ContentLines, Graph};
use crate::rng::RatRng;
use std::io::BufRead;
use tracing::info;

/// The rat population and its occupancy mirror.
#[derive(Debug, Clone)]
pub struct Population {
    global_seed: u64,
    /// Current node of each rat.
    pub(crate) position: Vec<u32>,
    /// Sampled destination of each rat within the current batch.
    pub(crate) next_position: Vec<u32>,
    /// Independent RNG stream per rat.
    pub(crate) seeds: Vec<RatRng>,
    /// Rats currently at each node. Authoritative on a worker's owned node
    /// range; the coordinator's copy is authoritative after each gather.
    pub(crate) rat_count: Vec<u32>,
}

impl Population {
    /// Build a population from explicit initial positions.
    pub fn from_positions(
        graph: &Graph,
        positions: Vec<u32>,
        global_seed: u64,
    ) -> Result<Self, RatLoadError> {
        if positions.is_empty() {
            return Err(RatLoadError::EmptyPopulation);
        }
        let nnode = graph.nnode();
        let mut rat_count = vec![0u32; nnode];
        for (agent, &node) in positions.iter().enumerate() {
            if node as usize >= nnode {
                return Err(RatLoadError::PositionOutOfRange { agent, node });
            }
            rat_count[node as usize] += 1;
        }
        let seeds = (0..positions.len())
            .map(|agent| RatRng::for_agent(global_seed, agent))
            .collect();
        Ok(Self {
            global_seed,
            next_position: positions.clone(),
            position: positions,
            seeds,
            rat_count,
        })
    }

    /// Read an initial-positions file.
    ///
    /// Format: an `nnode nrat` header (the node count must match the graph),
    /// then `nrat` lines each holding one node index. Comments and blank
    /// lines are skipped as in the graph format.
    pub fn from_reader<R: BufRead>(
        graph: &Graph,
        reader: R,
        global_seed: u64,
    ) -> Result<Self, RatLoadError> {
        let mut lines = ContentLines::new(reader);
        let (line, header) = match lines.next() {
            Some((line, text)) => (line, text?),
            None => return Err(RatLoadError::MalformedHeader { line: 1 }),
        };
        let mut fields = header.split_whitespace();
        let nnode: usize = fields
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or(RatLoadError::MalformedHeader { line })?;
        let nrat: usize = fields
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or(RatLoadError::MalformedHeader { line })?;
        if nnode != graph.nnode() {
            return Err(RatLoadError::SizeMismatch {
                graph_nodes: graph.nnode(),
                file_nodes: nnode,
            });
        }
        if nrat == 0 {
            return Err(RatLoadError::EmptyPopulation);
        }

        let mut positions = Vec::with_capacity(nrat);
        for _ in 0..nrat {
            let (line, text) = match lines.next() {
                Some((line, text)) => (line, text?),
                None => return Err(RatLoadError::Truncated { nrat }),
            };
            let node: u32 = text
                .trim()
                .parse()
                .map_err(|_| RatLoadError::MalformedLine { line })?;
            if node as usize >= nnode {
                return Err(RatLoadError::NodeOutOfRange { node, line });
            }
            positions.push(node);
        }
        info!(rats = nrat, "loaded rat positions");
        Self::from_positions(graph, positions, global_seed)
    }

    /// Number of rats.
    #[must_use]
    pub fn len(&self) -> usize {
        self.position.len()
    }

    /// True only for the degenerate empty population, which the loaders
    /// never produce.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    /// Current node of each rat.
    #[must_use]
    pub fn positions(&self) -> &[u32] {
        &self.position
    }

    /// Rats currently at each node.
    #[must_use]
    pub fn counts(&self) -> &[u32] {
        &self.rat_count
    }

    /// Seed this population's RNG streams were derived from.
    #[must_use]
    pub fn global_seed(&self) -> u64 {
        self.global_seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lattice4() -> Graph {
        Graph::lattice(2, 0)
    }

    #[test]
    fn positions_build_counts_and_seeds() {
        let graph = lattice4();
        let pop = Population::from_positions(&graph, vec![0, 0, 3, 1], 9).expect("population");
        assert_eq!(pop.len(), 4);
        assert_eq!(pop.counts(), &[2, 1, 0, 1]);
        assert_eq!(pop.global_seed(), 9);
        // Streams must match a fresh derivation from the same seed.
        assert_eq!(pop.seeds[2], RatRng::for_agent(9, 2));
    }

    #[test]
    fn rat_file_round_trips_header_and_positions() {
        let graph = lattice4();
        let text = "# initial placement\n4 3\n0\n# middle comment\n2\n2\n";
        let pop = Population::from_reader(&graph, text.as_bytes(), 1).expect("population");
        assert_eq!(pop.positions(), &[0, 2, 2]);
        assert_eq!(pop.counts(), &[1, 0, 2, 0]);
    }

    #[test]
    fn header_node_count_must_match_the_graph() {
        let graph = lattice4();
        let err = Population::from_reader(&graph, "9 2\n0\n0\n".as_bytes(), 1).unwrap_err();
        assert!(matches!(
            err,
            RatLoadError::SizeMismatch {
                graph_nodes: 4,
                file_nodes: 9
            }
        ));
    }

    #[test]
    fn malformed_inputs_name_the_offending_line() {
        let graph = lattice4();
        assert!(matches!(
            Population::from_reader(&graph, "abc\n".as_bytes(), 1).unwrap_err(),
            RatLoadError::MalformedHeader { line: 1 }
        ));
        assert!(matches!(
            Population::from_reader(&graph, "4 2\n0\nxyz\n".as_bytes(), 1).unwrap_err(),
            RatLoadError::MalformedLine { line: 3 }
        ));
        assert!(matches!(
            Population::from_reader(&graph, "4 2\n0\n7\n".as_bytes(), 1).unwrap_err(),
            RatLoadError::NodeOutOfRange { node: 7, line: 3 }
        ));
        assert!(matches!(
            Population::from_reader(&graph, "4 3\n0\n1\n".as_bytes(), 1).unwrap_err(),
            RatLoadError::Truncated { nrat: 3 }
        ));
    }

    #[test]
    fn empty_populations_are_rejected() {
        let graph = lattice4();
        assert!(matches!(
            Population::from_positions(&graph, Vec::new(), 1).unwrap_err(),
            RatLoadError::EmptyPopulation
        ));
        assert!(matches!(
            Population::from_reader(&graph, "4 0\n".as_bytes(), 1).unwrap_err(),
            RatLoadError::EmptyPopulation
        ));
    }

    #[test]
    fn out_of_range_position_is_rejected() {
        let graph = lattice4();
        assert!(matches!(
            Population::from_positions(&graph, vec![0, 4], 1).unwrap_err(),
            RatLoadError::PositionOutOfRange { agent: 1, node: 4 }
        ));
    }
}
