//! Floating-point operation accounting for instrumentation.
//!
//! The counter is kept per thread. Every rank runs on its own thread (one
//! process per rank under MPI, one thread per rank in a `ThreadComm` group),
//! so this is a per-rank counter without any cross-rank synchronization.

use std::cell::Cell;

thread_local! {
    static FLOP_COUNT: Cell<u64> = const { Cell::new(0) };
}

/// Add `n` operations to the calling rank's counter.
pub fn inc_flop_count(n: u64) {
    FLOP_COUNT.with(|c| c.set(c.get().saturating_add(n)));
}

/// Operations recorded on the calling rank since the last reset.
pub fn flop_count() -> u64 {
    FLOP_COUNT.with(Cell::get)
}

/// Zero the calling rank's counter, returning the previous value.
pub fn reset_flop_count() -> u64 {
    FLOP_COUNT.with(|c| c.replace(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accumulate_and_reset() {
        reset_flop_count();
        inc_flop_count(6);
        inc_flop_count(4);
        assert_eq!(flop_count(), 10);
        assert_eq!(reset_flop_count(), 10);
        assert_eq!(flop_count(), 0);
    }

    #[test]
    fn counters_are_per_thread() {
        reset_flop_count();
        inc_flop_count(3);
        std::thread::spawn(|| {
            assert_eq!(flop_count(), 0);
            inc_flop_count(100);
        })
        .join()
        .unwrap();
        assert_eq!(flop_count(), 3);
    }
}
