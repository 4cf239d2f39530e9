//! Immutable CSR adjacency for the lattice graph.
//!
//! Nodes are numbered row-major on an `nrow x nrow` square lattice. The
//! adjacency lives in a single arena `neighbor` of length `nnode + nedge`:
//! each node's block starts with the node itself (the synthesized self-edge)
//! followed by its out-neighbors in ascending order, and `neighbor_start`
//! gives every block's begin offset. The per-edge cumulative weights that
//! accompany this layout are owned by the simulation state, not the graph;
//! the graph itself never changes after load.

use crate::error::GraphLoadError;
use std::io::{self, BufRead};
use std::iter::Enumerate;
use std::ops::Range;
use tracing::info;

/// Iterator over the content lines of a textual input, skipping blank lines
/// and `#` comments, yielding 1-based line numbers for error reports.
pub(crate) struct ContentLines<R: BufRead> {
    lines: Enumerate<io::Lines<R>>,
}

impl<R: BufRead> ContentLines<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            lines: reader.lines().enumerate(),
        }
    }
}

impl<R: BufRead> Iterator for ContentLines<R> {
    type Item = (usize, io::Result<String>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (index, line) = self.lines.next()?;
            match line {
                Err(err) => return Some((index + 1, Err(err))),
                Ok(text) => {
                    let lead = text.trim_start();
                    if !lead.is_empty() && !lead.starts_with('#') {
                        return Some((index + 1, Ok(text)));
                    }
                }
            }
        }
    }
}

/// Immutable graph store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graph {
    nnode: usize,
    nedge: usize,
    nrow: usize,
    tile_size: usize,
    tiles_per_side: usize,
    neighbor: Vec<u32>,
    neighbor_start: Vec<usize>,
}

impl Graph {
    /// Load from a textual edge list.
    ///
    /// Format: an `nnode nedge [tile_size]` header, then `nedge` lines
    /// `head tail` with heads non-decreasing. Self-edges are not listed;
    /// the loader synthesizes one at the front of every block, including
    /// blocks of isolated nodes.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, GraphLoadError> {
        let mut lines = ContentLines::new(reader);
        let (line, header) = match lines.next() {
            Some((line, text)) => (line, text?),
            None => return Err(GraphLoadError::MalformedHeader { line: 1 }),
        };
        let mut fields = header.split_whitespace();
        let nnode: usize = fields
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or(GraphLoadError::MalformedHeader { line })?;
        let nedge: usize = fields
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or(GraphLoadError::MalformedHeader { line })?;
        let tile_size: usize = match fields.next() {
            None => 0,
            Some(t) => t
                .parse()
                .map_err(|_| GraphLoadError::MalformedHeader { line })?,
        };

        let arena_len = nnode
            .checked_add(nedge)
            .filter(|&n| n <= u32::MAX as usize)
            .ok_or(GraphLoadError::TooLarge { nnode, nedge })?;
        let nrow = nnode.isqrt();
        if nrow * nrow != nnode {
            return Err(GraphLoadError::NotSquare { nnode });
        }

        let mut neighbor = Vec::with_capacity(arena_len);
        let mut neighbor_start = vec![0usize; nnode + 1];
        let mut next_node = 0usize;
        for _ in 0..nedge {
            let (line, text) = match lines.next() {
                Some((line, text)) => (line, text?),
                None => return Err(GraphLoadError::Truncated { nedge }),
            };
            let mut parts = text.split_whitespace();
            let mut id = || parts.next().and_then(|t| t.parse::<usize>().ok());
            let (hid, tid) = match (id(), id()) {
                (Some(hid), Some(tid)) => (hid, tid),
                _ => return Err(GraphLoadError::MalformedEdge { line }),
            };
            if hid >= nnode {
                return Err(GraphLoadError::HeadOutOfRange { hid, line });
            }
            if tid >= nnode {
                return Err(GraphLoadError::TailOutOfRange { tid, line });
            }
            if next_node > hid + 1 {
                return Err(GraphLoadError::HeadOutOfOrder { hid, line });
            }
            // Open blocks (self-edge first) for every node up to this head.
            while next_node <= hid {
                neighbor_start[next_node] = neighbor.len();
                neighbor.push(next_node as u32);
                next_node += 1;
            }
            neighbor.push(tid as u32);
        }
        // Trailing isolated nodes still get a degree-1 block.
        while next_node < nnode {
            neighbor_start[next_node] = neighbor.len();
            neighbor.push(next_node as u32);
            next_node += 1;
        }
        neighbor_start[nnode] = neighbor.len();

        info!(nodes = nnode, edges = nedge, "loaded graph");
        Ok(Self::assemble(nnode, nedge, tile_size, neighbor, neighbor_start))
    }

    /// Build the 4-neighbor `nrow x nrow` lattice directly, with the same
    /// arena layout the loader produces. `tile_size` of zero means one row
    /// per strip.
    #[must_use]
    pub fn lattice(nrow: usize, tile_size: usize) -> Self {
        let nnode = nrow * nrow;
        let mut neighbor = Vec::with_capacity(nnode * 5);
        let mut neighbor_start = vec![0usize; nnode + 1];
        for row in 0..nrow {
            for col in 0..nrow {
                let node = row * nrow + col;
                neighbor_start[node] = neighbor.len();
                neighbor.push(node as u32);
                if row > 0 {
                    neighbor.push((node - nrow) as u32);
                }
                if col > 0 {
                    neighbor.push((node - 1) as u32);
                }
                if col + 1 < nrow {
                    neighbor.push((node + 1) as u32);
                }
                if row + 1 < nrow {
                    neighbor.push((node + nrow) as u32);
                }
            }
        }
        neighbor_start[nnode] = neighbor.len();
        let nedge = neighbor.len() - nnode;
        Self::assemble(nnode, nedge, tile_size, neighbor, neighbor_start)
    }

    fn assemble(
        nnode: usize,
        nedge: usize,
        tile_size: usize,
        neighbor: Vec<u32>,
        neighbor_start: Vec<usize>,
    ) -> Self {
        let nrow = nnode.isqrt();
        let tile_size = if tile_size == 0 {
            1
        } else {
            tile_size.min(nrow.max(1))
        };
        let tiles_per_side = if nrow == 0 { 0 } else { nrow.div_ceil(tile_size) };
        Self {
            nnode,
            nedge,
            nrow,
            tile_size,
            tiles_per_side,
            neighbor,
            neighbor_start,
        }
    }

    /// Number of nodes.
    #[must_use]
    pub fn nnode(&self) -> usize {
        self.nnode
    }

    /// Number of directed neighbor entries, excluding self-edges.
    #[must_use]
    pub fn nedge(&self) -> usize {
        self.nedge
    }

    /// Side length of the lattice.
    #[must_use]
    pub fn nrow(&self) -> usize {
        self.nrow
    }

    /// Rows per partition strip.
    #[must_use]
    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    /// Number of partition strips.
    #[must_use]
    pub fn tiles_per_side(&self) -> usize {
        self.tiles_per_side
    }

    /// Length of the adjacency arena (`nnode + nedge`).
    #[must_use]
    pub fn arena_len(&self) -> usize {
        self.neighbor.len()
    }

    /// Arena range of `node`'s block. The first slot is always the
    /// self-edge.
    #[inline]
    #[must_use]
    pub fn block(&self, node: u32) -> Range<usize> {
        let node = node as usize;
        self.neighbor_start[node]..self.neighbor_start[node + 1]
    }

    /// The full adjacency arena.
    #[must_use]
    pub fn neighbors(&self) -> &[u32] {
        &self.neighbor
    }

    /// Block begin offsets, one per node plus the terminal arena length.
    #[must_use]
    pub fn neighbor_start(&self) -> &[usize] {
        &self.neighbor_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LATTICE_2X2: &str = "\
# 2x2 lattice
4 8
0 1
0 2
1 0
1 3
2 0
2 3
3 1
3 2
";

    #[test]
    fn loader_synthesizes_self_edges_first() {
        let graph = Graph::from_reader(LATTICE_2X2.as_bytes()).expect("graph");
        assert_eq!(graph.nnode(), 4);
        assert_eq!(graph.nedge(), 8);
        assert_eq!(graph.arena_len(), 12);
        for node in 0..4u32 {
            let block = graph.block(node);
            assert_eq!(graph.neighbors()[block.start], node);
        }
        assert_eq!(&graph.neighbors()[graph.block(0)], &[0, 1, 2]);
        assert_eq!(&graph.neighbors()[graph.block(3)], &[3, 1, 2]);
    }

    #[test]
    fn loader_matches_the_lattice_builder() {
        let loaded = Graph::from_reader(LATTICE_2X2.as_bytes()).expect("graph");
        let built = Graph::lattice(2, 0);
        assert_eq!(loaded, built);
    }

    #[test]
    fn isolated_nodes_get_degree_one_blocks() {
        let graph = Graph::from_reader("4 0\n".as_bytes()).expect("graph");
        assert_eq!(graph.nedge(), 0);
        for node in 0..4u32 {
            assert_eq!(&graph.neighbors()[graph.block(node)], &[node]);
        }
    }

    #[test]
    fn interior_isolated_nodes_are_filled_in() {
        // Node 1 and 2 have no out-edges; their blocks must still exist.
        let graph = Graph::from_reader("4 2\n0 3\n3 0\n".as_bytes()).expect("graph");
        assert_eq!(&graph.neighbors()[graph.block(0)], &[0, 3]);
        assert_eq!(&graph.neighbors()[graph.block(1)], &[1]);
        assert_eq!(&graph.neighbors()[graph.block(2)], &[2]);
        assert_eq!(&graph.neighbors()[graph.block(3)], &[3, 0]);
    }

    #[test]
    fn header_may_carry_a_tile_size() {
        let graph = Graph::from_reader("16 0 2\n".as_bytes()).expect("graph");
        assert_eq!(graph.nrow(), 4);
        assert_eq!(graph.tile_size(), 2);
        assert_eq!(graph.tiles_per_side(), 2);
        let default = Graph::from_reader("16 0\n".as_bytes()).expect("graph");
        assert_eq!(default.tile_size(), 1);
        assert_eq!(default.tiles_per_side(), 4);
    }

    #[test]
    fn malformed_header_is_rejected() {
        let err = Graph::from_reader("abc\n".as_bytes()).unwrap_err();
        assert!(matches!(err, GraphLoadError::MalformedHeader { line: 1 }));
        assert!(err.to_string().contains("Malformed graph file header"));
    }

    #[test]
    fn out_of_order_heads_are_rejected() {
        let err = Graph::from_reader("4 2\n2 3\n0 1\n".as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            GraphLoadError::HeadOutOfOrder { hid: 0, line: 3 }
        ));
    }

    #[test]
    fn out_of_range_ids_are_rejected() {
        assert!(matches!(
            Graph::from_reader("4 1\n5 0\n".as_bytes()).unwrap_err(),
            GraphLoadError::HeadOutOfRange { hid: 5, line: 2 }
        ));
        assert!(matches!(
            Graph::from_reader("4 1\n0 9\n".as_bytes()).unwrap_err(),
            GraphLoadError::TailOutOfRange { tid: 9, line: 2 }
        ));
    }

    #[test]
    fn truncated_and_non_square_inputs_are_rejected() {
        assert!(matches!(
            Graph::from_reader("4 3\n0 1\n".as_bytes()).unwrap_err(),
            GraphLoadError::Truncated { nedge: 3 }
        ));
        assert!(matches!(
            Graph::from_reader("5 0\n".as_bytes()).unwrap_err(),
            GraphLoadError::NotSquare { nnode: 5 }
        ));
    }

    #[test]
    fn comments_and_blank_lines_are_skipped_anywhere() {
        let text = "# header comment\n\n4 2\n  # indented comment\n0 1\n\n1 0\n";
        let graph = Graph::from_reader(text.as_bytes()).expect("graph");
        assert_eq!(&graph.neighbors()[graph.block(0)], &[0, 1]);
        assert_eq!(&graph.neighbors()[graph.block(1)], &[1, 0]);
    }

    #[test]
    fn lattice_blocks_list_neighbors_in_ascending_order() {
        let graph = Graph::lattice(3, 1);
        assert_eq!(graph.nnode(), 9);
        assert_eq!(graph.nedge(), 24);
        // Center node 4 touches 1, 3, 5, 7.
        assert_eq!(&graph.neighbors()[graph.block(4)], &[4, 1, 3, 5, 7]);
        for node in 0..9u32 {
            let block = &graph.neighbors()[graph.block(node)];
            assert!(block[1..].windows(2).all(|w| w[0] < w[1]));
        }
    }
}
