//! In-process transport connecting worker threads over channels.
//!
//! Every endpoint holds a sender to each peer and a single inbox. A
//! collective posts typed payloads tagged with the caller's rank and a
//! per-endpoint sequence number; because all workers issue the same
//! collective sequence, equal sequence numbers identify the same logical
//! operation on every rank. Packets that arrive early (a faster peer already
//! in the next collective) are stashed until their operation comes up.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::time::{Duration, Instant};

use crate::{Payload, Transport, TransportError, check_displs, check_len, check_root};

/// How long a collective waits for a peer before declaring the run dead.
const COLLECTIVE_TIMEOUT: Duration = Duration::from_secs(30);

struct Packet {
    from: usize,
    seq: u64,
    payload: Box<dyn Any + Send>,
}

/// One worker's endpoint of an in-process collective group.
pub struct ChannelTransport {
    rank: usize,
    size: usize,
    peers: Vec<Sender<Packet>>,
    inbox: Receiver<Packet>,
    seq: Cell<u64>,
    stash: RefCell<Vec<Packet>>,
}

impl fmt::Debug for ChannelTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelTransport")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl ChannelTransport {
    /// Create a fully-connected group of `size` endpoints, one per worker.
    ///
    /// # Panics
    /// Panics if `size` is zero.
    #[must_use]
    pub fn hub(size: usize) -> Vec<Self> {
        assert!(size > 0, "transport group needs at least one worker");
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| unbounded()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| Self {
                rank,
                size,
                peers: senders.clone(),
                inbox,
                seq: Cell::new(0),
                stash: RefCell::new(Vec::new()),
            })
            .collect()
    }

    fn next_seq(&self) -> u64 {
        let seq = self.seq.get();
        self.seq.set(seq + 1);
        seq
    }

    fn post<T: Payload>(&self, to: usize, seq: u64, items: Vec<T>) -> Result<(), TransportError> {
        let packet = Packet {
            from: self.rank,
            seq,
            payload: Box::new(items),
        };
        self.peers[to]
            .send(packet)
            .map_err(|_| TransportError::Collective(format!("worker {to} is gone")))
    }

    fn take<T: Payload>(&self, from: usize, seq: u64) -> Result<Vec<T>, TransportError> {
        let packet = self.take_packet(from, seq)?;
        packet
            .payload
            .downcast::<Vec<T>>()
            .map(|items| *items)
            .map_err(|_| {
                TransportError::Collective(format!(
                    "worker {from} sent an unexpected payload type"
                ))
            })
    }

    fn take_packet(&self, from: usize, seq: u64) -> Result<Packet, TransportError> {
        {
            let mut stash = self.stash.borrow_mut();
            if let Some(at) = stash.iter().position(|p| p.from == from && p.seq == seq) {
                return Ok(stash.swap_remove(at));
            }
        }
        let deadline = Instant::now() + COLLECTIVE_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let packet = self.inbox.recv_timeout(remaining).map_err(|err| match err {
                RecvTimeoutError::Timeout => {
                    TransportError::Collective(format!("timed out waiting for worker {from}"))
                }
                RecvTimeoutError::Disconnected => {
                    TransportError::Collective("a worker hung up mid-collective".to_owned())
                }
            })?;
            if packet.from == from && packet.seq == seq {
                return Ok(packet);
            }
            if packet.seq < seq {
                return Err(TransportError::Collective(format!(
                    "worker {} is out of step",
                    packet.from
                )));
            }
            self.stash.borrow_mut().push(packet);
        }
    }

    fn others(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.size).filter(move |&p| p != self.rank)
    }
}

impl Transport for ChannelTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) -> Result<(), TransportError> {
        let seq = self.next_seq();
        for peer in self.others() {
            self.post::<u8>(peer, seq, Vec::new())?;
        }
        for peer in self.others() {
            self.take::<u8>(peer, seq)?;
        }
        Ok(())
    }

    fn broadcast<T: Payload>(&self, buf: &mut [T], root: usize) -> Result<(), TransportError> {
        check_root(root, self.size)?;
        let seq = self.next_seq();
        if self.rank == root {
            for peer in self.others() {
                self.post(peer, seq, buf.to_vec())?;
            }
        } else {
            let items = self.take::<T>(root, seq)?;
            check_len(items.len(), buf.len())?;
            buf.clone_from_slice(&items);
        }
        Ok(())
    }

    fn scatter<T: Payload>(
        &self,
        send: Option<&[T]>,
        recv: &mut [T],
        displs: &[usize],
        root: usize,
    ) -> Result<(), TransportError> {
        check_root(root, self.size)?;
        check_displs(displs, self.size)?;
        let seq = self.next_seq();
        let mine = displs[self.rank + 1] - displs[self.rank];
        check_len(recv.len(), mine)?;
        if self.rank == root {
            let send = send.ok_or(TransportError::InvalidLayout(
                "scatter root must supply a send buffer",
            ))?;
            check_len(send.len(), displs[self.size])?;
            for peer in self.others() {
                self.post(peer, seq, send[displs[peer]..displs[peer + 1]].to_vec())?;
            }
            recv.clone_from_slice(&send[displs[root]..displs[root + 1]]);
        } else {
            let items = self.take::<T>(root, seq)?;
            check_len(items.len(), mine)?;
            recv.clone_from_slice(&items);
        }
        Ok(())
    }

    fn gather<T: Payload>(
        &self,
        send: &[T],
        recv: Option<&mut [T]>,
        displs: &[usize],
        root: usize,
    ) -> Result<(), TransportError> {
        check_root(root, self.size)?;
        check_displs(displs, self.size)?;
        let seq = self.next_seq();
        check_len(send.len(), displs[self.rank + 1] - displs[self.rank])?;
        if self.rank == root {
            let recv = recv.ok_or(TransportError::InvalidLayout(
                "gather root must supply a receive buffer",
            ))?;
            check_len(recv.len(), displs[self.size])?;
            recv[displs[root]..displs[root + 1]].clone_from_slice(send);
            for peer in self.others() {
                let items = self.take::<T>(peer, seq)?;
                check_len(items.len(), displs[peer + 1] - displs[peer])?;
                recv[displs[peer]..displs[peer + 1]].clone_from_slice(&items);
            }
        } else {
            self.post(root, seq, send.to_vec())?;
        }
        Ok(())
    }

    fn all_gather<T: Payload>(
        &self,
        send: &[T],
        recv: &mut [T],
        displs: &[usize],
    ) -> Result<(), TransportError> {
        check_displs(displs, self.size)?;
        let seq = self.next_seq();
        check_len(send.len(), displs[self.rank + 1] - displs[self.rank])?;
        check_len(recv.len(), displs[self.size])?;
        for peer in self.others() {
            self.post(peer, seq, send.to_vec())?;
        }
        recv[displs[self.rank]..displs[self.rank + 1]].clone_from_slice(send);
        for peer in self.others() {
            let items = self.take::<T>(peer, seq)?;
            check_len(items.len(), displs[peer + 1] - displs[peer])?;
            recv[displs[peer]..displs[peer + 1]].clone_from_slice(&items);
        }
        Ok(())
    }
}
