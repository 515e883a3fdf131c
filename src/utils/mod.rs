//! Shared helpers
//!
//! - Stats: normal CDF and clamping used by the analyzers
//! - Concurrency: deadline-bounded task fan-out on a rayon pool

pub mod stats;
pub mod concurrency;

pub use stats::{clamp01, mean, normal_cdf, prob_below, round2};
pub use concurrency::{run_with_deadline, CancelToken, TaskOutcome};
