//! Matvec communication pattern.
//!
//! For a fixed matrix the pattern records, on each rank,
//!
//! - which owned vector entries go to which neighbour: `send_procs[i]`
//!   receives `send_map_elmts[send_map_starts[i]..send_map_starts[i + 1]]`;
//! - where incoming ghost values land: values from `recv_procs[i]` fill
//!   `recv_vec_starts[i]..recv_vec_starts[i + 1]` of the ghost buffer, in the
//!   order of the offd column numbering.
//!
//! A forward exchange moves owned values into neighbours' ghost buffers; a
//! reverse exchange moves ghost-indexed partial sums back to their owners.

use std::ops::Range;

use crate::error::KError;
use crate::matrix::ParCsrMatrix;
use crate::parallel::Comm;

/// Which way data flows through a [`CommPattern`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeDirection {
    /// Owned entries (send layout) → neighbours' ghost buffers (receive layout).
    Forward,
    /// Ghost-indexed values (receive layout) → owners (send layout).
    Reverse,
}

/// Send and receive maps derived from a matrix's offd columns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommPattern {
    send_procs: Vec<usize>,
    send_map_starts: Vec<usize>,
    send_map_elmts: Vec<usize>,
    recv_procs: Vec<usize>,
    recv_vec_starts: Vec<usize>,
}

impl CommPattern {
    /// A pattern with no neighbours.
    pub fn empty() -> Self {
        Self {
            send_map_starts: vec![0],
            recv_vec_starts: vec![0],
            ..Self::default()
        }
    }

    /// Assemble from explicit maps, e.g. when a pattern comes from elsewhere.
    pub fn from_parts(
        send_procs: Vec<usize>,
        send_map_starts: Vec<usize>,
        send_map_elmts: Vec<usize>,
        recv_procs: Vec<usize>,
        recv_vec_starts: Vec<usize>,
    ) -> Result<Self, KError> {
        check_offsets("send", &send_procs, &send_map_starts, send_map_elmts.len())?;
        let recv_len = recv_vec_starts.last().copied().unwrap_or(0);
        check_offsets("recv", &recv_procs, &recv_vec_starts, recv_len)?;
        Ok(Self { send_procs, send_map_starts, send_map_elmts, recv_procs, recv_vec_starts })
    }

    /// Derive the pattern for `a` collectively.
    ///
    /// Each rank works out which ranks own its offd columns, tells those
    /// owners which global columns it needs, and turns the requests it
    /// receives into its send map.
    pub fn build<C: Comm>(comm: &C, a: &ParCsrMatrix) -> Result<Self, KError> {
        let _span = tracing::debug_span!(
            "comm_pattern_build",
            rank = comm.rank(),
            num_cols_offd = a.num_cols_offd()
        )
        .entered();

        let col_starts = a.col_starts();
        let size = comm.size();

        // Receive side: col_map_offd is sorted, so owners come out grouped
        // and ascending.
        let mut recv_procs: Vec<usize> = Vec::new();
        let mut recv_vec_starts = vec![0];
        let mut requests: Vec<Vec<usize>> = vec![Vec::new(); size];
        for (k, &g) in a.col_map_offd().iter().enumerate() {
            let owner = owner_of(col_starts, g);
            if recv_procs.last() != Some(&owner) {
                if !recv_procs.is_empty() {
                    recv_vec_starts.push(k);
                }
                recv_procs.push(owner);
            }
            requests[owner].push(g);
        }
        if !recv_procs.is_empty() {
            recv_vec_starts.push(a.col_map_offd().len());
        }

        let incoming = comm.exchange_indices(requests)?;

        // Send side: answer requests in ascending rank order.
        let (first_col, last_col) = (a.first_col_diag(), col_starts[comm.rank() + 1]);
        let mut send_procs = Vec::new();
        let mut send_map_starts = vec![0];
        let mut send_map_elmts = Vec::new();
        for (peer, wanted) in incoming.into_iter().enumerate() {
            if wanted.is_empty() {
                continue;
            }
            for g in wanted {
                if !(first_col..last_col).contains(&g) {
                    return Err(KError::Pattern(format!(
                        "rank {peer} requested column {g}, rank {} owns {first_col}..{last_col}",
                        comm.rank()
                    )));
                }
                send_map_elmts.push(g - first_col);
            }
            send_procs.push(peer);
            send_map_starts.push(send_map_elmts.len());
        }

        tracing::debug!(
            num_sends = send_procs.len(),
            num_recvs = recv_procs.len(),
            send_len = send_map_elmts.len(),
            "communication pattern built"
        );

        Ok(Self { send_procs, send_map_starts, send_map_elmts, recv_procs, recv_vec_starts })
    }

    pub fn num_sends(&self) -> usize {
        self.send_procs.len()
    }

    pub fn num_recvs(&self) -> usize {
        self.recv_procs.len()
    }

    pub fn send_procs(&self) -> &[usize] {
        &self.send_procs
    }

    pub fn send_map_starts(&self) -> &[usize] {
        &self.send_map_starts
    }

    /// Flattened owned indices, grouped by send target.
    pub fn send_map_elmts(&self) -> &[usize] {
        &self.send_map_elmts
    }

    pub fn recv_procs(&self) -> &[usize] {
        &self.recv_procs
    }

    pub fn recv_vec_starts(&self) -> &[usize] {
        &self.recv_vec_starts
    }

    /// Total number of owned entries sent per forward exchange.
    pub fn send_len(&self) -> usize {
        self.send_map_starts.last().copied().unwrap_or(0)
    }

    /// Total number of ghost entries received per forward exchange.
    pub fn recv_len(&self) -> usize {
        self.recv_vec_starts.last().copied().unwrap_or(0)
    }

    /// `(peer, range into send_map_elmts)` for every send target.
    pub fn send_targets(&self) -> impl Iterator<Item = (usize, Range<usize>)> + '_ {
        segments(&self.send_procs, &self.send_map_starts)
    }

    /// `(peer, range into the ghost buffer)` for every receive source.
    pub fn recv_sources(&self) -> impl Iterator<Item = (usize, Range<usize>)> + '_ {
        segments(&self.recv_procs, &self.recv_vec_starts)
    }

    /// Segments of the outgoing buffer for `direction`.
    pub fn outgoing(&self, direction: ExchangeDirection) -> impl Iterator<Item = (usize, Range<usize>)> + '_ {
        match direction {
            ExchangeDirection::Forward => segments(&self.send_procs, &self.send_map_starts),
            ExchangeDirection::Reverse => segments(&self.recv_procs, &self.recv_vec_starts),
        }
    }

    /// Segments of the incoming buffer for `direction`.
    pub fn incoming(&self, direction: ExchangeDirection) -> impl Iterator<Item = (usize, Range<usize>)> + '_ {
        match direction {
            ExchangeDirection::Forward => segments(&self.recv_procs, &self.recv_vec_starts),
            ExchangeDirection::Reverse => segments(&self.send_procs, &self.send_map_starts),
        }
    }

    /// Outgoing buffer length for `direction`.
    pub fn outgoing_len(&self, direction: ExchangeDirection) -> usize {
        match direction {
            ExchangeDirection::Forward => self.send_len(),
            ExchangeDirection::Reverse => self.recv_len(),
        }
    }

    /// Incoming buffer length for `direction`.
    pub fn incoming_len(&self, direction: ExchangeDirection) -> usize {
        match direction {
            ExchangeDirection::Forward => self.recv_len(),
            ExchangeDirection::Reverse => self.send_len(),
        }
    }
}

fn segments<'a>(procs: &'a [usize], starts: &'a [usize]) -> impl Iterator<Item = (usize, Range<usize>)> + 'a {
    procs
        .iter()
        .zip(starts.windows(2))
        .map(|(&p, w)| (p, w[0]..w[1]))
}

/// Rank whose column range contains `g`; empty ranks are skipped.
fn owner_of(col_starts: &[usize], g: usize) -> usize {
    col_starts.partition_point(|&s| s <= g).saturating_sub(1)
}

fn check_offsets(what: &str, procs: &[usize], starts: &[usize], len: usize) -> Result<(), KError> {
    if starts.len() != procs.len() + 1
        || starts[0] != 0
        || starts[procs.len()] != len
        || starts.windows(2).any(|w| w[0] > w[1])
    {
        return Err(KError::Pattern(format!(
            "{what} offsets do not cover {} peers and {len} entries",
            procs.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_lookup_skips_empty_ranks() {
        let starts = [0, 2, 2, 4];
        assert_eq!(owner_of(&starts, 0), 0);
        assert_eq!(owner_of(&starts, 1), 0);
        assert_eq!(owner_of(&starts, 2), 2);
        assert_eq!(owner_of(&starts, 3), 2);
    }

    #[test]
    fn directions_swap_layouts() {
        let p = CommPattern::from_parts(vec![1, 3], vec![0, 2, 3], vec![4, 0, 1], vec![2], vec![0, 5]).unwrap();
        assert_eq!(p.outgoing_len(ExchangeDirection::Forward), 3);
        assert_eq!(p.incoming_len(ExchangeDirection::Forward), 5);
        assert_eq!(p.outgoing_len(ExchangeDirection::Reverse), 5);
        assert_eq!(p.incoming_len(ExchangeDirection::Reverse), 3);
        assert_eq!(
            p.outgoing(ExchangeDirection::Forward).collect::<Vec<_>>(),
            vec![(1, 0..2), (3, 2..3)]
        );
        assert_eq!(p.incoming(ExchangeDirection::Reverse).collect::<Vec<_>>(), p.send_targets().collect::<Vec<_>>());
        assert_eq!(p.outgoing(ExchangeDirection::Reverse).collect::<Vec<_>>(), vec![(2, 0..5)]);
    }

    #[test]
    fn bad_offsets_rejected() {
        assert!(CommPattern::from_parts(vec![1], vec![0, 3], vec![0, 1], vec![], vec![0]).is_err());
        assert!(CommPattern::from_parts(vec![], vec![0], vec![], vec![1], vec![0]).is_err());
    }

    #[test]
    fn empty_pattern_moves_nothing() {
        let p = CommPattern::empty();
        assert_eq!(p.send_len(), 0);
        assert_eq!(p.recv_len(), 0);
        assert_eq!(p.send_targets().count(), 0);
    }
}
