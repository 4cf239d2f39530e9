//! Occupancy-dependent node weights.
//!
//! A node's attractiveness peaks when its occupancy sits at `OPTIMAL_LOAD`
//! times the mean and falls off symmetrically in log-space on either side.
//! The function is strictly positive on non-negative inputs, which keeps
//! every block's cumulative weight total positive and the sampler total
//! well-defined.

use serde::{Deserialize, Serialize};

/// Occupancy giving the maximum weight, in load-factor units.
const OPTIMAL_LOAD: f64 = 1.5;
/// Steepness of the fall-off away from the optimum.
const CROWD_COEFF: f64 = 0.5;

/// Weight of a node at normalized load `val`.
#[must_use]
pub fn mweight(val: f64) -> f64 {
    let lg = (1.0 + CROWD_COEFF * (val - OPTIMAL_LOAD)).ln() * std::f64::consts::LOG2_E;
    1.0 / (1.0 + lg * lg)
}

/// Precomputed map from agent count to node weight.
///
/// Tabulating over every possible count `0..=nrat` makes the per-node lookup
/// during a census O(1) regardless of the weight formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightTable {
    weights: Vec<f64>,
}

impl WeightTable {
    /// Tabulate weights for a population of `nrat` on `nnode` nodes.
    #[must_use]
    pub fn build(nrat: usize, nnode: usize) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let load_factor = nrat as f64 / nnode as f64;
        #[allow(clippy::cast_precision_loss)]
        let weights = (0..=nrat)
            .map(|count| mweight(count as f64 / load_factor))
            .collect();
        Self { weights }
    }

    /// Weight of a node holding `count` agents.
    #[inline]
    #[must_use]
    pub fn get(&self, count: u32) -> f64 {
        self.weights[count as usize]
    }

    /// Number of tabulated counts (`nrat + 1`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// True only for the degenerate empty table.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}
