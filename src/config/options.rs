//! API options for the distributed kernels.
//!
//! This module provides the `KernelOptions` struct, which controls how much
//! intra-rank parallelism the kernels use. Ranks themselves are fixed by the
//! communicator; these options only govern the rayon loops inside a rank
//! (local CSR rows and structured box loops).

/// Default minimum number of rows (or box points) before a loop goes parallel.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 4096;

/// Intra-rank parallelism settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelOptions {
    /// Loops shorter than this run serially even with the `rayon` feature.
    pub parallel_threshold: usize,

    /// Worker threads for the global rayon pool.
    pub num_threads: usize,
}

impl KernelOptions {
    pub fn new() -> Self {
        Self {
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            num_threads: default_threads(),
        }
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    pub fn with_num_threads(mut self, n: usize) -> Self {
        self.num_threads = n.max(1);
        self
    }

    /// Whether a loop of `len` iterations should use the rayon pool.
    pub fn use_parallel(&self, len: usize) -> bool {
        cfg!(feature = "rayon") && len >= self.parallel_threshold
    }

    /// Build the global rayon pool with `num_threads` workers.
    ///
    /// The global pool can only be configured once per process; later calls
    /// leave the existing pool in place.
    #[cfg(feature = "rayon")]
    pub fn init_thread_pool(&self) {
        if rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .build_global()
            .is_err()
        {
            tracing::debug!(
                num_threads = self.num_threads,
                "global rayon pool already initialized"
            );
        }
    }
}

impl Default for KernelOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "rayon")]
fn default_threads() -> usize {
    num_cpus::get()
}

#[cfg(not(feature = "rayon"))]
fn default_threads() -> usize {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let opts = KernelOptions::default()
            .with_parallel_threshold(10)
            .with_num_threads(0);
        assert_eq!(opts.parallel_threshold, 10);
        assert_eq!(opts.num_threads, 1);
    }

    #[test]
    fn short_loops_stay_serial() {
        let opts = KernelOptions::default().with_parallel_threshold(100);
        assert!(!opts.use_parallel(99));
        assert_eq!(opts.use_parallel(100), cfg!(feature = "rayon"));
    }
}
