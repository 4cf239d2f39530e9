//! Snapshot emission for per-step node counts.
//!
//! The engine decides *when* a snapshot is due; a sink decides *where* it
//! goes. The textual stream format is the external interface consumed by
//! downstream tooling, so [`StreamSink`] writes it byte-for-byte: a
//! `STEP <nnode> <nrat>` header, one count per line in row-major lattice
//! order, `END`, and a single trailing `DONE` after the final step.

use std::io::{self, Write};

/// Receives count snapshots from the simulation coordinator.
pub trait SnapshotSink {
    /// Called with the full per-node counts on each due step.
    fn snapshot(&mut self, nnode: usize, nrat: usize, counts: &[u32]) -> io::Result<()>;

    /// Called once after the final step.
    fn done(&mut self) -> io::Result<()>;
}

/// Discards all snapshots (quiet mode).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl SnapshotSink for NullSink {
    fn snapshot(&mut self, _nnode: usize, _nrat: usize, _counts: &[u32]) -> io::Result<()> {
        Ok(())
    }

    fn done(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writes the textual snapshot stream to any writer.
#[derive(Debug)]
pub struct StreamSink<W: Write> {
    writer: W,
}

impl<W: Write> StreamSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Recover the underlying writer, e.g. to inspect a captured stream.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> SnapshotSink for StreamSink<W> {
    fn snapshot(&mut self, nnode: usize, nrat: usize, counts: &[u32]) -> io::Result<()> {
        writeln!(self.writer, "STEP {nnode} {nrat}")?;
        for &count in counts {
            writeln!(self.writer, "{count}")?;
        }
        writeln!(self.writer, "END")
    }

    fn done(&mut self) -> io::Result<()> {
        writeln!(self.writer, "DONE")?;
        self.writer.flush()
    }
}
