//! Deterministic per-agent random streams.
//!
//! Each rat owns an independent PCG stream seeded only from the run's global
//! seed and the rat's index, so the values a rat draws depend on neither the
//! worker count nor any other rat. PCG is used rather than the standard
//! `SmallRng` because its output is specified and identical across word
//! sizes, which the reproducibility contract requires.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

/// 64-bit fractional part of the golden ratio; spreads consecutive agent
/// indices uniformly across the seed space.
const SEED_MIX: u64 = 0x9e37_79b9_7f4a_7c15;

/// Pseudo-random stream owned by a single rat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatRng(Pcg32);

impl RatRng {
    /// Seed deterministically from the run's global seed and a rat index.
    #[must_use]
    pub fn for_agent(global_seed: u64, agent: usize) -> Self {
        let seed = global_seed ^ (agent as u64).wrapping_mul(SEED_MIX);
        Self(Pcg32::seed_from_u64(seed))
    }

    /// Next uniform double in `[0, bound)`.
    #[inline]
    pub fn next_f64(&mut self, bound: f64) -> f64 {
        self.0.random::<f64>() * bound
    }
}
