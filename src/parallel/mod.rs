//! Communication backends for the distributed kernels.
//!
//! The [`Comm`] trait is the only channel between ranks: a non-blocking
//! point-to-point exchange driven by a [`CommPattern`], blocking sum
//! reductions, and a sparse all-to-all of index lists used once per matrix
//! to build its pattern.
//!
//! Backends:
//! - [`SerialComm`]: a single rank; exchanges loop back, reductions are identity.
//! - [`ThreadComm`]: an in-process group of ranks, one thread each, connected by channels.
//! - `MpiComm` (feature `mpi`): inter-process MPI.
//! - [`UniverseComm`]: runtime choice among the compiled-in backends.

use num_complex::Complex;

use crate::error::KError;

pub mod pattern;
pub use pattern::{CommPattern, ExchangeDirection};

pub mod thread_comm;
pub use thread_comm::ThreadComm;

#[cfg(feature = "mpi")]
pub mod mpi_comm;
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;

/// An exchange that has been started but not necessarily finished.
pub trait ExchangeHandle {
    /// Block until every transfer named by the pattern has completed.
    /// Calling it again is a no-op.
    fn wait(&mut self) -> Result<(), KError>;

    /// Whether the receive buffer is known to be fully populated.
    fn is_complete(&self) -> bool;

    /// Wait, then hand back the receive buffer.
    fn finish(self) -> Result<Vec<f64>, KError>;
}

pub trait Comm {
    /// In-flight exchange; may borrow the communicator.
    type Handle<'a>: ExchangeHandle
    where
        Self: 'a;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    fn barrier(&self) -> Result<(), KError>;

    /// Sum `x` over all ranks. Every rank gets the same value.
    fn all_reduce(&self, x: f64) -> Result<f64, KError>;

    /// Sum a complex value over all ranks (reduced as a real/imaginary pair).
    fn all_reduce_complex(&self, z: Complex<f64>) -> Result<Complex<f64>, KError>;

    /// Sparse all-to-all: `outgoing[p]` goes to rank `p`; the result holds
    /// at index `p` what rank `p` sent here. `outgoing.len()` must equal `size()`.
    fn exchange_indices(&self, outgoing: Vec<Vec<usize>>) -> Result<Vec<Vec<usize>>, KError>;

    /// Start moving `send` to the neighbours named by `pattern` and filling
    /// `recv` from them. `send` and `recv` must have the outgoing and
    /// incoming lengths of `pattern` for `direction`.
    fn begin_exchange<'a>(
        &'a self,
        direction: ExchangeDirection,
        pattern: &CommPattern,
        send: Vec<f64>,
        recv: Vec<f64>,
    ) -> Result<Self::Handle<'a>, KError>;

    // Global dot product of the local slices
    fn dot(&self, a: &[f64], b: &[f64]) -> Result<f64, KError> {
        let local = a.iter().zip(b).map(|(&x, &y)| x * y).sum::<f64>();
        self.all_reduce(local)
    }
}

fn check_buffers(
    direction: ExchangeDirection,
    pattern: &CommPattern,
    send: &[f64],
    recv: &[f64],
) -> Result<(), KError> {
    let (want_send, want_recv) = (pattern.outgoing_len(direction), pattern.incoming_len(direction));
    if send.len() != want_send || recv.len() != want_recv {
        return Err(KError::Comm(format!(
            "{direction:?} exchange expects send/recv lengths {want_send}/{want_recv}, got {}/{}",
            send.len(),
            recv.len()
        )));
    }
    Ok(())
}

/// Copy segments a rank sends to itself into its own receive buffer.
///
/// The k-th outgoing segment addressed to `rank` pairs with the k-th
/// incoming segment from `rank`.
fn loopback(rank: usize, direction: ExchangeDirection, pattern: &CommPattern, send: &[f64], recv: &mut [f64]) {
    let out = pattern.outgoing(direction).filter(|(p, _)| *p == rank);
    let inc = pattern.incoming(direction).filter(|(p, _)| *p == rank);
    for ((_, src), (_, dst)) in out.zip(inc) {
        let n = src.len().min(dst.len());
        recv[dst.start..dst.start + n].copy_from_slice(&send[src.start..src.start + n]);
    }
}

/// Handle for an exchange that finished when it was started.
#[derive(Debug)]
pub struct ReadyHandle {
    recv: Vec<f64>,
}

impl ExchangeHandle for ReadyHandle {
    fn wait(&mut self) -> Result<(), KError> {
        Ok(())
    }
    fn is_complete(&self) -> bool {
        true
    }
    fn finish(self) -> Result<Vec<f64>, KError> {
        Ok(self.recv)
    }
}

/// Single-rank communicator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialComm;

impl Comm for SerialComm {
    type Handle<'a> = ReadyHandle where Self: 'a;

    fn rank(&self) -> usize { 0 }
    fn size(&self) -> usize { 1 }
    fn barrier(&self) -> Result<(), KError> { Ok(()) }

    fn all_reduce(&self, x: f64) -> Result<f64, KError> {
        Ok(x)
    }

    fn all_reduce_complex(&self, z: Complex<f64>) -> Result<Complex<f64>, KError> {
        Ok(z)
    }

    fn exchange_indices(&self, outgoing: Vec<Vec<usize>>) -> Result<Vec<Vec<usize>>, KError> {
        if outgoing.len() != 1 {
            return Err(KError::Comm(format!(
                "index exchange over 1 rank given {} lists",
                outgoing.len()
            )));
        }
        Ok(outgoing)
    }

    fn begin_exchange<'a>(
        &'a self,
        direction: ExchangeDirection,
        pattern: &CommPattern,
        send: Vec<f64>,
        mut recv: Vec<f64>,
    ) -> Result<ReadyHandle, KError> {
        check_buffers(direction, pattern, &send, &recv)?;
        if let Some((peer, _)) = pattern
            .outgoing(direction)
            .chain(pattern.incoming(direction))
            .find(|(p, _)| *p != 0)
        {
            return Err(KError::Comm(format!("serial communicator has no rank {peer}")));
        }
        loopback(0, direction, pattern, &send, &mut recv);
        Ok(ReadyHandle { recv })
    }
}

/// Runtime-selected communicator.
pub enum UniverseComm {
    Serial(SerialComm),
    Thread(ThreadComm),
    #[cfg(feature = "mpi")]
    Mpi(MpiComm),
}

impl UniverseComm {
    /// The MPI world when built with `mpi`, otherwise a single serial rank.
    pub fn world() -> Self {
        #[cfg(feature = "mpi")]
        {
            UniverseComm::Mpi(MpiComm::new())
        }
        #[cfg(not(feature = "mpi"))]
        {
            UniverseComm::Serial(SerialComm)
        }
    }
}

/// Handle returned by [`UniverseComm::begin_exchange`].
pub enum UniverseHandle<'a> {
    Ready(ReadyHandle),
    Thread(thread_comm::ThreadHandle<'a>),
    #[cfg(feature = "mpi")]
    Mpi(mpi_comm::MpiHandle),
}

impl ExchangeHandle for UniverseHandle<'_> {
    fn wait(&mut self) -> Result<(), KError> {
        match self {
            UniverseHandle::Ready(h) => h.wait(),
            UniverseHandle::Thread(h) => h.wait(),
            #[cfg(feature = "mpi")]
            UniverseHandle::Mpi(h) => h.wait(),
        }
    }
    fn is_complete(&self) -> bool {
        match self {
            UniverseHandle::Ready(h) => h.is_complete(),
            UniverseHandle::Thread(h) => h.is_complete(),
            #[cfg(feature = "mpi")]
            UniverseHandle::Mpi(h) => h.is_complete(),
        }
    }
    fn finish(self) -> Result<Vec<f64>, KError> {
        match self {
            UniverseHandle::Ready(h) => h.finish(),
            UniverseHandle::Thread(h) => h.finish(),
            #[cfg(feature = "mpi")]
            UniverseHandle::Mpi(h) => h.finish(),
        }
    }
}

impl Comm for UniverseComm {
    type Handle<'a> = UniverseHandle<'a> where Self: 'a;

    fn rank(&self) -> usize {
        match self {
            UniverseComm::Serial(comm) => comm.rank(),
            UniverseComm::Thread(comm) => comm.rank(),
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.rank(),
        }
    }
    fn size(&self) -> usize {
        match self {
            UniverseComm::Serial(comm) => comm.size(),
            UniverseComm::Thread(comm) => comm.size(),
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.size(),
        }
    }
    fn barrier(&self) -> Result<(), KError> {
        match self {
            UniverseComm::Serial(comm) => comm.barrier(),
            UniverseComm::Thread(comm) => comm.barrier(),
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.barrier(),
        }
    }
    fn all_reduce(&self, x: f64) -> Result<f64, KError> {
        match self {
            UniverseComm::Serial(comm) => comm.all_reduce(x),
            UniverseComm::Thread(comm) => comm.all_reduce(x),
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.all_reduce(x),
        }
    }
    fn all_reduce_complex(&self, z: Complex<f64>) -> Result<Complex<f64>, KError> {
        match self {
            UniverseComm::Serial(comm) => comm.all_reduce_complex(z),
            UniverseComm::Thread(comm) => comm.all_reduce_complex(z),
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.all_reduce_complex(z),
        }
    }
    fn exchange_indices(&self, outgoing: Vec<Vec<usize>>) -> Result<Vec<Vec<usize>>, KError> {
        match self {
            UniverseComm::Serial(comm) => comm.exchange_indices(outgoing),
            UniverseComm::Thread(comm) => comm.exchange_indices(outgoing),
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.exchange_indices(outgoing),
        }
    }
    fn begin_exchange<'a>(
        &'a self,
        direction: ExchangeDirection,
        pattern: &CommPattern,
        send: Vec<f64>,
        recv: Vec<f64>,
    ) -> Result<UniverseHandle<'a>, KError> {
        match self {
            UniverseComm::Serial(comm) => comm
                .begin_exchange(direction, pattern, send, recv)
                .map(UniverseHandle::Ready),
            UniverseComm::Thread(comm) => comm
                .begin_exchange(direction, pattern, send, recv)
                .map(UniverseHandle::Thread),
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm
                .begin_exchange(direction, pattern, send, recv)
                .map(UniverseHandle::Mpi),
        }
    }
}
