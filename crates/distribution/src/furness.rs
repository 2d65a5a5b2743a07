//! Furness balancing (iterative proportional fitting) of one product's matrix.
//!
//! Each pass scales one axis so its sums hit the marginal targets, starting
//! with origins (rows, production) and alternating with destinations
//! (columns, consumption). A pass's factors are `f[k] = target[k] / sum[k]`;
//! slices whose current sum is zero have no factor and are left untouched.
//! A positive target on such a slice can never be reached: that pass and the
//! following one count as a full miss (deviation 1), since the axis stays
//! off target while the other one is scaled.
//! The loop stops once a pass needs no factor further than `tolerance` from
//! 1, provided the other axis has been scaled at least once: the other axis
//! was exact after the previous pass, so both sets of sums are then within
//! tolerance. After `max_iterations` unsuccessful passes the matrix is
//! returned as-is and the product is reported as not converged.

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::model::{Axis, ConvergenceDiagnostics, MarginalTable, OdMatrix};

pub const DEFAULT_TOLERANCE: f64 = 0.05;
pub const DEFAULT_MAX_ITERATIONS: usize = 500;

/// Balancing parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Furness {
    /// Stop when `max |1 - f[k]|` over a pass is at or below this.
    pub tolerance: f64,
    /// Passes allowed without meeting the tolerance before giving up.
    pub max_iterations: usize,
}

impl Default for Furness {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// A product's matrix after balancing, with how it got there.
#[derive(Debug, Clone)]
pub struct Balanced {
    pub matrix: OdMatrix,
    pub diagnostics: ConvergenceDiagnostics,
}

/// Mutable working state of one product's loop. Never shared across products.
struct BalanceState {
    matrix: OdMatrix,
    axis: Axis,
    passes: usize,
    residual: f64,
    /// The previous pass left a positive target at zero.
    missed: bool,
}

impl BalanceState {
    fn new(matrix: OdMatrix) -> Self {
        Self {
            matrix,
            axis: Axis::Origin,
            passes: 0,
            residual: f64::INFINITY,
            missed: false,
        }
    }

    /// Scale the current axis onto `targets`; returns the pass deviation.
    fn step(&mut self, targets: &BTreeMap<String, f64>) -> f64 {
        let sums = self.matrix.axis_sums(self.axis);
        let factors = axis_factors(&sums, targets);
        self.matrix.scale_axis(self.axis, &factors);
        let missed = has_unreachable_target(&sums, targets);
        self.residual = max_deviation(&factors);
        if missed || self.missed {
            self.residual = self.residual.max(1.0);
        }
        self.missed = missed;
        self.residual
    }
}

impl Furness {
    pub fn new(tolerance: f64, max_iterations: usize) -> Self {
        Self {
            tolerance,
            max_iterations,
        }
    }

    /// Balance `seed` so row sums approach `production` and column sums
    /// approach `consumption` (region → target; missing regions target 0).
    pub fn balance(
        &self,
        product: &str,
        seed: OdMatrix,
        production: &BTreeMap<String, f64>,
        consumption: &BTreeMap<String, f64>,
    ) -> Balanced {
        let mut state = BalanceState::new(seed);
        let mut converged = false;

        loop {
            let targets = match state.axis {
                Axis::Origin => production,
                Axis::Destination => consumption,
            };
            let deviation = state.step(targets);

            if deviation <= self.tolerance && state.passes > 0 {
                converged = true;
                break;
            }

            state.passes += 1;
            if state.passes >= self.max_iterations {
                break;
            }
            state.axis = state.axis.flip();
        }

        if converged {
            debug!(
                "{product}: converged after {} iterations (residual {:.5})",
                state.passes, state.residual
            );
        } else {
            warn!(
                "{product}: not converged after {} iterations (residual {:.5}, last axis {})",
                state.passes, state.residual, state.axis
            );
        }

        Balanced {
            diagnostics: ConvergenceDiagnostics {
                product: product.to_string(),
                converged,
                iterations_used: state.passes,
                residual: state.residual,
            },
            matrix: state.matrix,
        }
    }

    /// Balance every `(product, seed)` job against its own marginals.
    ///
    /// Output order follows `jobs`. With the `parallel` feature products are
    /// balanced on the rayon pool; each job owns its matrix.
    pub fn balance_products(
        &self,
        jobs: Vec<(String, OdMatrix)>,
        production: &MarginalTable,
        consumption: &MarginalTable,
    ) -> Vec<(String, Balanced)> {
        let run = |(product, seed): (String, OdMatrix)| {
            let rows = production.for_product(&product);
            let cols = consumption.for_product(&product);
            let balanced = self.balance(&product, seed, &rows, &cols);
            (product, balanced)
        };

        #[cfg(feature = "parallel")]
        let balanced: Vec<(String, Balanced)> = {
            use rayon::prelude::*;
            jobs.into_par_iter().map(run).collect()
        };

        #[cfg(not(feature = "parallel"))]
        let balanced: Vec<(String, Balanced)> = jobs.into_iter().map(run).collect();

        balanced
    }
}

/// Scaling factor per axis index; indices with a zero current sum get none.
pub fn axis_factors(
    sums: &BTreeMap<String, f64>,
    targets: &BTreeMap<String, f64>,
) -> BTreeMap<String, f64> {
    sums.iter()
        .filter(|(_, sum)| **sum != 0.0)
        .map(|(k, sum)| {
            let target = targets.get(k).copied().unwrap_or(0.0);
            (k.clone(), target / sum)
        })
        .collect()
}

/// `max |1 - f|`; zero when no index had a factor.
fn max_deviation(factors: &BTreeMap<String, f64>) -> f64 {
    factors
        .values()
        .map(|f| (1.0 - f).abs())
        .fold(0.0, f64::max)
}

/// A positive target whose slice sums to zero (or is absent) cannot be scaled onto.
fn has_unreachable_target(sums: &BTreeMap<String, f64>, targets: &BTreeMap<String, f64>) -> bool {
    targets
        .iter()
        .any(|(k, target)| *target > 0.0 && sums.get(k).copied().unwrap_or(0.0) == 0.0)
}
