//! In-process communicator: a group of ranks, one thread each.
//!
//! Every ordered pair of ranks gets its own FIFO channel, so messages between
//! two ranks arrive in the order they were sent, as with MPI's non-overtaking
//! rule. Sends never block; receives block inside [`ExchangeHandle::wait`]
//! and the collectives. As long as all ranks issue collectives and exchanges
//! in the same order, every receive matches the right message.
//!
//! Reductions send each rank's value to every other rank and sum the values
//! in rank order, so all ranks obtain bitwise identical results.

use std::ops::Range;
use std::sync::mpsc::{self, Receiver, Sender};

use num_complex::Complex;

use super::pattern::{CommPattern, ExchangeDirection};
use super::{check_buffers, loopback, Comm, ExchangeHandle};
use crate::error::KError;

#[derive(Debug)]
enum Message {
    Values(Vec<f64>),
    Indices(Vec<usize>),
    Scalar([f64; 2]),
}

impl Message {
    fn kind(&self) -> &'static str {
        match self {
            Message::Values(_) => "values",
            Message::Indices(_) => "indices",
            Message::Scalar(_) => "scalar",
        }
    }
}

/// One rank of an in-process group. Created with [`ThreadComm::group`].
#[derive(Debug)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
    /// `senders[dst]`
    senders: Vec<Sender<Message>>,
    /// `receivers[src]`
    receivers: Vec<Receiver<Message>>,
}

impl ThreadComm {
    /// Create the endpoints of a `size`-rank group; endpoint `r` is rank `r`.
    pub fn group(size: usize) -> Vec<ThreadComm> {
        let size = size.max(1);
        let mut senders: Vec<Vec<Sender<Message>>> = (0..size).map(|_| Vec::with_capacity(size)).collect();
        let mut receivers: Vec<Vec<Option<Receiver<Message>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();
        for (src, row) in senders.iter_mut().enumerate() {
            for inbox in receivers.iter_mut() {
                let (tx, rx) = mpsc::channel();
                row.push(tx);
                inbox[src] = Some(rx);
            }
        }
        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (senders, inbox))| ThreadComm {
                rank,
                size,
                senders,
                receivers: inbox.into_iter().flatten().collect(),
            })
            .collect()
    }

    /// Run `f` once per rank on scoped threads and collect the results in
    /// rank order. A panic on any rank is re-raised here.
    pub fn run<F, R>(size: usize, f: F) -> Vec<R>
    where
        F: Fn(ThreadComm) -> R + Sync,
        R: Send,
    {
        let comms = Self::group(size);
        std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    let f = &f;
                    s.spawn(move || f(comm))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        })
    }

    fn send(&self, dst: usize, msg: Message) -> Result<(), KError> {
        self.senders[dst]
            .send(msg)
            .map_err(|_| KError::Comm(format!("rank {dst} hung up before rank {} could send", self.rank)))
    }

    fn recv(&self, src: usize) -> Result<Message, KError> {
        self.receivers[src]
            .recv()
            .map_err(|_| KError::Comm(format!("rank {src} hung up before rank {} could receive", self.rank)))
    }

    fn unexpected(&self, src: usize, want: &str, got: &Message) -> KError {
        KError::Comm(format!(
            "rank {} expected {want} from rank {src}, got {}",
            self.rank,
            got.kind()
        ))
    }

    /// Every rank's pair, indexed by rank.
    fn all_gather_pair(&self, pair: [f64; 2]) -> Result<Vec<[f64; 2]>, KError> {
        for dst in (0..self.size).filter(|&r| r != self.rank) {
            self.send(dst, Message::Scalar(pair))?;
        }
        (0..self.size)
            .map(|src| {
                if src == self.rank {
                    return Ok(pair);
                }
                match self.recv(src)? {
                    Message::Scalar(v) => Ok(v),
                    other => Err(self.unexpected(src, "scalar", &other)),
                }
            })
            .collect()
    }
}

impl Comm for ThreadComm {
    type Handle<'a> = ThreadHandle<'a> where Self: 'a;

    fn rank(&self) -> usize { self.rank }
    fn size(&self) -> usize { self.size }

    fn barrier(&self) -> Result<(), KError> {
        self.all_gather_pair([0.0; 2]).map(|_| ())
    }

    fn all_reduce(&self, x: f64) -> Result<f64, KError> {
        let values = self.all_gather_pair([x, 0.0])?;
        Ok(values.iter().fold(0.0, |acc, v| acc + v[0]))
    }

    fn all_reduce_complex(&self, z: Complex<f64>) -> Result<Complex<f64>, KError> {
        let values = self.all_gather_pair([z.re, z.im])?;
        Ok(values
            .iter()
            .fold(Complex::new(0.0, 0.0), |acc, v| acc + Complex::new(v[0], v[1])))
    }

    fn exchange_indices(&self, mut outgoing: Vec<Vec<usize>>) -> Result<Vec<Vec<usize>>, KError> {
        if outgoing.len() != self.size {
            return Err(KError::Comm(format!(
                "index exchange over {} ranks given {} lists",
                self.size,
                outgoing.len()
            )));
        }
        let own = std::mem::take(&mut outgoing[self.rank]);
        for (dst, list) in outgoing.into_iter().enumerate() {
            if dst != self.rank {
                self.send(dst, Message::Indices(list))?;
            }
        }
        let mut own = Some(own);
        (0..self.size)
            .map(|src| {
                if src == self.rank {
                    return Ok(own.take().unwrap_or_default());
                }
                match self.recv(src)? {
                    Message::Indices(list) => Ok(list),
                    other => Err(self.unexpected(src, "indices", &other)),
                }
            })
            .collect()
    }

    fn begin_exchange<'a>(
        &'a self,
        direction: ExchangeDirection,
        pattern: &CommPattern,
        send: Vec<f64>,
        mut recv: Vec<f64>,
    ) -> Result<ThreadHandle<'a>, KError> {
        check_buffers(direction, pattern, &send, &recv)?;
        if let Some((peer, _)) = pattern
            .outgoing(direction)
            .chain(pattern.incoming(direction))
            .find(|(p, _)| *p >= self.size)
        {
            return Err(KError::Comm(format!("no rank {peer} in a group of {}", self.size)));
        }
        tracing::trace!(rank = self.rank, ?direction, send_len = send.len(), "exchange started");

        for (peer, range) in pattern.outgoing(direction) {
            if peer != self.rank {
                self.send(peer, Message::Values(send[range].to_vec()))?;
            }
        }
        loopback(self.rank, direction, pattern, &send, &mut recv);

        let pending: Vec<(usize, Range<usize>)> = pattern
            .incoming(direction)
            .filter(|(peer, _)| *peer != self.rank)
            .collect();
        Ok(ThreadHandle { comm: self, pending, recv, complete: false })
    }
}

/// An exchange in flight on a [`ThreadComm`].
///
/// Dropping an unfinished handle still drains its messages, so the channels
/// stay in step for later operations.
#[derive(Debug)]
pub struct ThreadHandle<'a> {
    comm: &'a ThreadComm,
    pending: Vec<(usize, Range<usize>)>,
    recv: Vec<f64>,
    complete: bool,
}

impl ExchangeHandle for ThreadHandle<'_> {
    fn wait(&mut self) -> Result<(), KError> {
        if self.complete {
            return Ok(());
        }
        for (peer, range) in std::mem::take(&mut self.pending) {
            match self.comm.recv(peer)? {
                Message::Values(v) if v.len() == range.len() => self.recv[range].copy_from_slice(&v),
                Message::Values(v) => {
                    return Err(KError::Comm(format!(
                        "rank {} expected {} values from rank {peer}, got {}",
                        self.comm.rank,
                        range.len(),
                        v.len()
                    )));
                }
                other => return Err(self.comm.unexpected(peer, "values", &other)),
            }
        }
        self.complete = true;
        tracing::trace!(rank = self.comm.rank, "exchange complete");
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn finish(mut self) -> Result<Vec<f64>, KError> {
        self.wait()?;
        Ok(std::mem::take(&mut self.recv))
    }
}

impl Drop for ThreadHandle<'_> {
    fn drop(&mut self) {
        if !self.complete {
            let _ = self.wait();
        }
    }
}
