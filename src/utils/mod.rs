pub mod flops;
pub mod scratch;

pub use flops::{flop_count, inc_flop_count, reset_flop_count};
