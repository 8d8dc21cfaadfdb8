//! Hessian approximation updates.
//!
//! Each [`HessianUpdate`] strategy knows when it is applicable for a given
//! step `s = x_k - x_{k-1}` and gradient difference `y = g_k - g_{k-1}`, and
//! how to produce the updated (direct, not inverse) Hessian. A
//! [`HessianUpdater`] tries an ordered list of strategies and falls back to
//! the identity matrix when none applies.
//!
//! # Available strategies
//!
//! - **BFGS (positive definite)**: the classical secant update, gated on the
//!   curvature condition `s.y > 0`. This is the default and only entry of the
//!   default list.
//! - **Damped BFGS**: Powell's damping of `y`, which keeps the update positive
//!   definite even when the curvature condition fails.
//! - **SR1**: symmetric rank-one update, which can follow negative curvature.

use crate::linalg::{chol_decompose, condition_number, symmetrize};
use ndarray::{Array1, Array2};
use serde::Deserialize;

// Powell damping threshold and the SR1 skip ratio.
const DAMPING_THRESHOLD: f64 = 0.2;
const SR1_SKIP_RATIO: f64 = 1e-8;

/// A quasi-Newton update rule for the Hessian approximation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HessianUpdate {
    /// `H + yy^T/(y^T s) - Hss^TH/(s^THs)`, applicable only if `s.y > 0`.
    BfgsPositiveDefinite,
    /// BFGS with `y` replaced by the Powell-damped `r = theta*y + (1-theta)*Hs`.
    BfgsDamped,
    /// `H + vv^T/(v.s)` with `v = y - Hs`.
    Sr1,
}

impl HessianUpdate {
    /// Whether this update may be applied to `(h, s, y)`.
    pub fn conditions_met(&self, h: &Array2<f64>, s: &Array1<f64>, y: &Array1<f64>) -> bool {
        if !s.iter().chain(y.iter()).all(|v| v.is_finite()) {
            return false;
        }
        match self {
            HessianUpdate::BfgsPositiveDefinite => {
                let s_h_s = s.dot(&h.dot(s));
                s.dot(y) > 0.0 && s_h_s > 0.0
            }
            HessianUpdate::BfgsDamped => s.dot(&h.dot(s)) > 0.0,
            HessianUpdate::Sr1 => {
                let v = y - &h.dot(s);
                let v_norm = v.dot(&v).sqrt();
                let s_norm = s.dot(s).sqrt();
                v_norm > 0.0 && v.dot(s).abs() >= SR1_SKIP_RATIO * s_norm * v_norm
            }
        }
    }

    /// The updated Hessian. Only meaningful when [`conditions_met`](Self::conditions_met) holds.
    pub fn updated(&self, h: &Array2<f64>, s: &Array1<f64>, y: &Array1<f64>) -> Array2<f64> {
        let mut h_new = match self {
            HessianUpdate::BfgsPositiveDefinite => bfgs(h, s, y),
            HessianUpdate::BfgsDamped => {
                let h_s = h.dot(s);
                let s_h_s = s.dot(&h_s);
                let s_y = s.dot(y);
                let theta = if s_y >= DAMPING_THRESHOLD * s_h_s {
                    1.0
                } else {
                    (1.0 - DAMPING_THRESHOLD) * s_h_s / (s_h_s - s_y)
                };
                let r = y * theta + &h_s * (1.0 - theta);
                bfgs(h, s, &r)
            }
            HessianUpdate::Sr1 => {
                let v = y - &h.dot(s);
                let denom = v.dot(s);
                let mut h_new = h.clone();
                let n = h.nrows();
                for i in 0..n {
                    for j in 0..n {
                        h_new[[i, j]] += v[i] * v[j] / denom;
                    }
                }
                h_new
            }
        };
        symmetrize(&mut h_new);
        h_new
    }

    /// `Some(updated)` if applicable, `None` otherwise.
    pub fn apply(&self, h: &Array2<f64>, s: &Array1<f64>, y: &Array1<f64>) -> Option<Array2<f64>> {
        if self.conditions_met(h, s, y) {
            Some(self.updated(h, s, y))
        } else {
            None
        }
    }
}

// Direct-form BFGS: H - (Hs)(Hs)^T / (s^T H s) + y y^T / (y^T s).
fn bfgs(h: &Array2<f64>, s: &Array1<f64>, y: &Array1<f64>) -> Array2<f64> {
    let h_s = h.dot(s);
    let s_h_s = s.dot(&h_s);
    let y_s = y.dot(s);
    let n = h.nrows();
    let mut h_new = h.clone();
    for i in 0..n {
        for j in 0..n {
            h_new[[i, j]] += y[i] * y[j] / y_s - h_s[i] * h_s[j] / s_h_s;
        }
    }
    h_new
}

/// Where the Hessian used for a step came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HessianSource {
    /// No previous estimate existed.
    ColdStart,
    /// The previous estimate was too ill-conditioned to update.
    IllConditionedReset,
    /// A strategy produced the update.
    Updated(HessianUpdate),
    /// No strategy was applicable.
    FallbackReset,
}

impl HessianSource {
    pub fn is_reset(&self) -> bool {
        matches!(
            self,
            HessianSource::IllConditionedReset | HessianSource::FallbackReset
        )
    }
}

/// Previous Hessian together with the step and gradient difference that followed it.
#[derive(Debug, Clone, Copy)]
pub struct SecantPair<'a> {
    pub hessian: &'a Array2<f64>,
    pub s: &'a Array1<f64>,
    pub y: &'a Array1<f64>,
}

/// Applies an ordered list of strategies with identity fallbacks.
#[derive(Debug, Clone)]
pub struct HessianUpdater {
    strategies: Vec<HessianUpdate>,
    max_condition_number: f64,
    verify_positive_definite: bool,
}

impl HessianUpdater {
    pub fn new(
        strategies: Vec<HessianUpdate>,
        max_condition_number: f64,
        verify_positive_definite: bool,
    ) -> Self {
        Self {
            strategies,
            max_condition_number,
            verify_positive_definite,
        }
    }

    /// Produces the Hessian for the next step of an `n`-dimensional problem.
    ///
    /// `previous` is `None` before the first estimate; the identity is
    /// returned in that case, when the previous estimate is near-singular,
    /// and when no strategy applies.
    pub fn update(&self, n: usize, previous: Option<SecantPair<'_>>) -> (Array2<f64>, HessianSource) {
        let Some(SecantPair { hessian, s, y }) = previous else {
            return (Array2::eye(n), HessianSource::ColdStart);
        };
        if condition_number(hessian) > self.max_condition_number {
            return (Array2::eye(n), HessianSource::IllConditionedReset);
        }
        for strategy in &self.strategies {
            let Some(candidate) = strategy.apply(hessian, s, y) else {
                continue;
            };
            if candidate.iter().any(|v| !v.is_finite()) {
                continue;
            }
            if self.verify_positive_definite && chol_decompose(&candidate).is_none() {
                continue;
            }
            return (candidate, HessianSource::Updated(*strategy));
        }
        (Array2::eye(n), HessianSource::FallbackReset)
    }
}
