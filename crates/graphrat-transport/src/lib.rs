//! Collective-communication and partitioning primitives for SPMD workers.
//!
//! The simulation engine is written once in single-program-multiple-data
//! style: every worker runs the same step loop and all data exchange flows
//! through the [`Transport`] capability. [`LocalTransport`] services a solo
//! worker with plain copies; [`channel::ChannelTransport`] connects a set of
//! in-process worker threads over channels. Engine code never branches on
//! which implementation is in use.
//!
//! Chunked collectives (`scatter`, `gather`, `all_gather`) describe their
//! data layout with a displacement vector `displs` of length `size + 1`:
//! worker `p` owns the half-open element range `displs[p]..displs[p + 1]`
//! of the full buffer.

pub mod channel;
pub mod partition;

use thiserror::Error;

/// Errors raised by collective operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A root or peer rank outside `0..size`.
    #[error("rank {rank} out of range for {size} workers")]
    InvalidRank { rank: usize, size: usize },
    /// A buffer whose length disagrees with the collective's layout.
    #[error("collective buffer length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    /// A displacement vector that is not a valid layout for this world.
    #[error("invalid collective layout: {0}")]
    InvalidLayout(&'static str),
    /// A peer stopped responding or sent an unexpected payload.
    #[error("collective failed: {0}")]
    Collective(String),
}

/// Element types that may travel through a collective.
pub trait Payload: Clone + Send + 'static {}

impl<T: Clone + Send + 'static> Payload for T {}

/// Collective operations shared by every worker of one run.
///
/// All collectives are synchronous: each call blocks until every worker has
/// reached the matching call. Workers must issue the same sequence of
/// collectives in the same order; a divergent sequence is reported as
/// [`TransportError::Collective`] rather than silently misdelivered.
pub trait Transport {
    /// This worker's rank in `0..size`.
    fn rank(&self) -> usize;

    /// Number of cooperating workers.
    fn size(&self) -> usize;

    /// Block until every worker reaches the same point.
    fn barrier(&self) -> Result<(), TransportError>;

    /// Replicate `buf` on `root` into every worker's `buf`.
    fn broadcast<T: Payload>(&self, buf: &mut [T], root: usize) -> Result<(), TransportError>;

    /// Distribute `send` on `root` in `displs` chunks; each worker receives
    /// its own chunk into `recv`. Non-root workers pass `None` for `send`.
    fn scatter<T: Payload>(
        &self,
        send: Option<&[T]>,
        recv: &mut [T],
        displs: &[usize],
        root: usize,
    ) -> Result<(), TransportError>;

    /// Collect each worker's `send` chunk into `recv` on `root` at `displs`
    /// offsets. Non-root workers pass `None` for `recv`.
    fn gather<T: Payload>(
        &self,
        send: &[T],
        recv: Option<&mut [T]>,
        displs: &[usize],
        root: usize,
    ) -> Result<(), TransportError>;

    /// Collect each worker's `send` chunk into every worker's `recv`.
    fn all_gather<T: Payload>(
        &self,
        send: &[T],
        recv: &mut [T],
        displs: &[usize],
    ) -> Result<(), TransportError>;
}

/// Validate a displacement vector against a world size.
fn check_displs(displs: &[usize], size: usize) -> Result<(), TransportError> {
    if displs.len() != size + 1 {
        return Err(TransportError::InvalidLayout(
            "displacement vector must have size + 1 entries",
        ));
    }
    if displs.windows(2).any(|w| w[0] > w[1]) {
        return Err(TransportError::InvalidLayout(
            "displacements must be non-decreasing",
        ));
    }
    Ok(())
}

fn check_root(root: usize, size: usize) -> Result<(), TransportError> {
    if root >= size {
        return Err(TransportError::InvalidRank { rank: root, size });
    }
    Ok(())
}

fn check_len(actual: usize, expected: usize) -> Result<(), TransportError> {
    if actual != expected {
        return Err(TransportError::LengthMismatch { expected, actual });
    }
    Ok(())
}

/// Transport for a single-worker run. Every collective degenerates to a
/// local copy or a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTransport;

impl Transport for LocalTransport {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) -> Result<(), TransportError> {
        Ok(())
    }

    fn broadcast<T: Payload>(&self, _buf: &mut [T], root: usize) -> Result<(), TransportError> {
        check_root(root, 1)
    }

    fn scatter<T: Payload>(
        &self,
        send: Option<&[T]>,
        recv: &mut [T],
        displs: &[usize],
        root: usize,
    ) -> Result<(), TransportError> {
        check_root(root, 1)?;
        check_displs(displs, 1)?;
        let send = send.ok_or(TransportError::InvalidLayout(
            "scatter root must supply a send buffer",
        ))?;
        check_len(send.len(), displs[1])?;
        check_len(recv.len(), displs[1] - displs[0])?;
        recv.clone_from_slice(&send[displs[0]..displs[1]]);
        Ok(())
    }

    fn gather<T: Payload>(
        &self,
        send: &[T],
        recv: Option<&mut [T]>,
        displs: &[usize],
        root: usize,
    ) -> Result<(), TransportError> {
        check_root(root, 1)?;
        check_displs(displs, 1)?;
        let recv = recv.ok_or(TransportError::InvalidLayout(
            "gather root must supply a receive buffer",
        ))?;
        check_len(send.len(), displs[1] - displs[0])?;
        check_len(recv.len(), displs[1])?;
        recv[displs[0]..displs[1]].clone_from_slice(send);
        Ok(())
    }

    fn all_gather<T: Payload>(
        &self,
        send: &[T],
        recv: &mut [T],
        displs: &[usize],
    ) -> Result<(), TransportError> {
        check_displs(displs, 1)?;
        check_len(send.len(), displs[1] - displs[0])?;
        check_len(recv.len(), displs[1])?;
        recv[displs[0]..displs[1]].clone_from_slice(send);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_transport_is_a_world_of_one() {
        let t = LocalTransport;
        assert_eq!(t.rank(), 0);
        assert_eq!(t.size(), 1);
        t.barrier().expect("barrier");
    }

    #[test]
    fn local_broadcast_leaves_buffer_untouched() {
        let t = LocalTransport;
        let mut buf = vec![1.0, 2.0, 3.0];
        t.broadcast(&mut buf, 0).expect("broadcast");
        assert_eq!(buf, vec![1.0, 2.0, 3.0]);
        assert!(matches!(
            t.broadcast(&mut buf, 1),
            Err(TransportError::InvalidRank { rank: 1, size: 1 })
        ));
    }

    #[test]
    fn local_chunked_collectives_copy_in_place() {
        let t = LocalTransport;
        let displs = [0usize, 4];

        let send = [7u32, 8, 9, 10];
        let mut recv = [0u32; 4];
        t.scatter(Some(&send), &mut recv, &displs, 0).expect("scatter");
        assert_eq!(recv, send);

        let mut full = [0u32; 4];
        t.gather(&send, Some(&mut full), &displs, 0).expect("gather");
        assert_eq!(full, send);

        let mut all = [0u32; 4];
        t.all_gather(&send, &mut all, &displs).expect("all_gather");
        assert_eq!(all, send);
    }

    #[test]
    fn local_collectives_reject_bad_layouts() {
        let t = LocalTransport;
        let send = [1u32, 2];
        let mut recv = [0u32; 2];
        assert!(matches!(
            t.scatter(Some(&send), &mut recv, &[0, 1, 2], 0),
            Err(TransportError::InvalidLayout(_))
        ));
        assert!(matches!(
            t.all_gather(&send, &mut recv, &[0, 3]),
            Err(TransportError::LengthMismatch { expected: 3, .. })
        ));
        assert!(matches!(
            t.gather(&send, None, &[0, 2], 0),
            Err(TransportError::InvalidLayout(_))
        ));
    }
}
