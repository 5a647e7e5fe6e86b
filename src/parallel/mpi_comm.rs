//! MPI-based parallel communication module.
//!
//! This module provides an implementation of the `Comm` trait using the MPI (Message Passing Interface)
//! backend for distributed-memory parallelism. Exchanges are posted as immediate sends and receives
//! and completed in [`ExchangeHandle::wait`], so local work can run while data is in flight.
//! The implementation is only available when the `mpi` feature is enabled.
//!
//! # Usage
//!
//! - `MpiComm::new()` initializes MPI and keeps the universe alive for as long as the communicator.
//! - The `Comm` trait is implemented for `MpiComm`, allowing it to be used as a drop-in replacement
//!   for the serial or thread-group backends.
//!
//! # References
//! - [MPI Standard](https://www.mpi-forum.org/)
//!
//! # Example
//! ```no_run
//! #[cfg(feature = "mpi")]
//! {
//!     use kryst_kernels::parallel::{Comm, MpiComm};
//!     let comm = MpiComm::new();
//!     println!("Rank: {} / {}", comm.rank(), comm.size());
//! }
//! ```

use mpi::collective::SystemOperation;
use mpi::datatype::{Partition, PartitionMut};
use mpi::environment::Universe;
use mpi::request::{Request, StaticScope};
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;
use mpi::Count;
use num_complex::Complex;

use super::pattern::{CommPattern, ExchangeDirection};
use super::{check_buffers, Comm, ExchangeHandle};
use crate::error::KError;

const EXCHANGE_TAG: i32 = 0x6b72;

/// MPI communicator wrapper for distributed parallelism.
///
/// Holds the MPI universe (finalized on drop), the world communicator, the rank of the current
/// process, and the total number of processes.
pub struct MpiComm {
    _universe: Universe,
    /// The MPI world communicator (all processes in the job).
    pub world: SimpleCommunicator,
    /// The rank (ID) of this process within the communicator.
    pub rank: usize,
    /// The total number of processes in the communicator.
    pub size: usize,
}

impl MpiComm {
    /// Initializes MPI and constructs a new `MpiComm` instance.
    ///
    /// # Panics
    /// Panics if MPI initialization fails or MPI was already initialized.
    pub fn new() -> Self {
        let universe = mpi::initialize().expect("MPI initialization failed");
        let world = universe.world();
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        MpiComm { _universe: universe, world, rank, size }
    }
}

impl Default for MpiComm {
    fn default() -> Self {
        Self::new()
    }
}

impl Comm for MpiComm {
    type Handle<'a> = MpiHandle where Self: 'a;

    /// Returns the rank (ID) of this process.
    fn rank(&self) -> usize { self.rank }
    /// Returns the total number of processes in the communicator.
    fn size(&self) -> usize { self.size }
    /// Synchronizes all processes at a barrier.
    fn barrier(&self) -> Result<(), KError> {
        self.world.barrier();
        Ok(())
    }

    /// Performs an all-reduce sum operation across all processes.
    fn all_reduce(&self, x: f64) -> Result<f64, KError> {
        let mut y = x;
        self.world.all_reduce_into(&x, &mut y, &SystemOperation::sum());
        Ok(y)
    }

    /// Complex all-reduce as a two-element real sum.
    fn all_reduce_complex(&self, z: Complex<f64>) -> Result<Complex<f64>, KError> {
        let send = [z.re, z.im];
        let mut recv = [0.0f64; 2];
        self.world.all_reduce_into(&send[..], &mut recv[..], &SystemOperation::sum());
        Ok(Complex::new(recv[0], recv[1]))
    }

    /// Counts go out with an all-to-all, the lists with a varcount all-to-all.
    fn exchange_indices(&self, outgoing: Vec<Vec<usize>>) -> Result<Vec<Vec<usize>>, KError> {
        if outgoing.len() != self.size {
            return Err(KError::Comm(format!(
                "index exchange over {} ranks given {} lists",
                self.size,
                outgoing.len()
            )));
        }
        let send_counts: Vec<Count> = outgoing.iter().map(|v| v.len() as Count).collect();
        let mut recv_counts = vec![0 as Count; self.size];
        self.world.all_to_all_into(&send_counts[..], &mut recv_counts[..]);

        let displs = |counts: &[Count]| -> Vec<Count> {
            counts
                .iter()
                .scan(0 as Count, |acc, &c| {
                    let d = *acc;
                    *acc += c;
                    Some(d)
                })
                .collect()
        };
        let send_displs = displs(&send_counts);
        let recv_displs = displs(&recv_counts);

        let flat: Vec<u64> = outgoing.iter().flatten().map(|&g| g as u64).collect();
        let total: usize = recv_counts.iter().map(|&c| c as usize).sum();
        let mut recv_flat = vec![0u64; total];
        {
            let send_part = Partition::new(&flat[..], &send_counts[..], &send_displs[..]);
            let mut recv_part = PartitionMut::new(&mut recv_flat[..], &recv_counts[..], &recv_displs[..]);
            self.world.all_to_all_varcount_into(&send_part, &mut recv_part);
        }

        Ok(recv_counts
            .iter()
            .zip(&recv_displs)
            .map(|(&c, &d)| {
                recv_flat[d as usize..(d + c) as usize]
                    .iter()
                    .map(|&g| g as usize)
                    .collect()
            })
            .collect())
    }

    fn begin_exchange<'a>(
        &'a self,
        direction: ExchangeDirection,
        pattern: &CommPattern,
        send: Vec<f64>,
        recv: Vec<f64>,
    ) -> Result<MpiHandle, KError> {
        check_buffers(direction, pattern, &send, &recv)?;

        // The requests outlive this call, so the buffers move to the heap and
        // are only reclaimed once every request has completed.
        let send_ptr: *mut [f64] = Box::into_raw(send.into_boxed_slice());
        let recv_ptr: *mut [f64] = Box::into_raw(recv.into_boxed_slice());
        // SAFETY: both pointers come from `Box::into_raw` and stay valid until
        // `MpiHandle::reclaim`, which runs only after every request is waited on.
        let (send_buf, mut rest): (&'static [f64], &'static mut [f64]) =
            unsafe { (&*send_ptr, &mut *recv_ptr) };

        let mut requests = Vec::new();
        for (peer, range) in pattern.incoming(direction) {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(range.len());
            rest = tail;
            requests.push(
                self.world
                    .process_at_rank(peer as i32)
                    .immediate_receive_into_with_tag(StaticScope, head, EXCHANGE_TAG),
            );
        }
        let mut sends = Vec::new();
        for (peer, range) in pattern.outgoing(direction) {
            sends.push(
                self.world
                    .process_at_rank(peer as i32)
                    .immediate_send_with_tag(StaticScope, &send_buf[range], EXCHANGE_TAG),
            );
        }

        Ok(MpiHandle {
            recvs: requests,
            sends,
            send_ptr: Some(send_ptr),
            recv_ptr: Some(recv_ptr),
            complete: false,
        })
    }
}

/// An MPI exchange in flight. Owns its buffers until completion.
pub struct MpiHandle {
    recvs: Vec<Request<'static, [f64], StaticScope>>,
    sends: Vec<Request<'static, [f64], StaticScope>>,
    send_ptr: Option<*mut [f64]>,
    recv_ptr: Option<*mut [f64]>,
    complete: bool,
}

impl MpiHandle {
    /// Release the send buffer and hand back the receive buffer.
    fn reclaim(&mut self) -> Vec<f64> {
        debug_assert!(self.complete);
        // SAFETY: every request referencing these buffers has completed.
        unsafe {
            if let Some(p) = self.send_ptr.take() {
                drop(Box::from_raw(p));
            }
            self.recv_ptr
                .take()
                .map(|p| Box::from_raw(p).into_vec())
                .unwrap_or_default()
        }
    }
}

impl ExchangeHandle for MpiHandle {
    fn wait(&mut self) -> Result<(), KError> {
        if self.complete {
            return Ok(());
        }
        for req in self.recvs.drain(..) {
            req.wait();
        }
        for req in self.sends.drain(..) {
            req.wait();
        }
        self.complete = true;
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn finish(mut self) -> Result<Vec<f64>, KError> {
        self.wait()?;
        Ok(self.reclaim())
    }
}

impl Drop for MpiHandle {
    fn drop(&mut self) {
        let _ = self.wait();
        self.reclaim();
    }
}
