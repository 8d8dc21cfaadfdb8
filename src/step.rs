//! Line-search free step length control.
//!
//! The step follows the Newton-type direction `d = -H^{-1} g`, scaled by
//! `t = rho / ((rho + delta) * delta)` where `rho = g^T H^{-1} g` and
//! `delta` is the length of `d`, then clamped to a maximum Euclidean length.
//! No objective evaluation is needed.
//!
//! `delta` is measured in the metric of the current Hessian approximation,
//! `sqrt(d^T H d)`, by default. With that choice `t = 1 / (1 + sqrt(rho))`,
//! which tends to one (the full Newton step) as the gradient vanishes. The
//! plain Euclidean length is available through [`StepMetric::Euclidean`];
//! both agree whenever `H` is the identity.

use crate::linalg::{invert, norm};
use ndarray::{Array1, Array2};
use serde::Deserialize;

/// How the direction length `delta` is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepMetric {
    /// `sqrt(d^T H d)`. Falls back to the Euclidean length if `H` is not
    /// positive along `d`.
    #[default]
    Hessian,
    /// `||d||`.
    Euclidean,
}

/// A step together with the quantities that produced it.
#[derive(Debug, Clone)]
pub struct AdaptiveStep {
    pub step: Array1<f64>,
    /// Length of `t * d` before clamping.
    pub raw_length: f64,
    pub clamped: bool,
}

/// Computes the adaptive step for gradient `grad` and Hessian approximation `hess`.
///
/// Returns `None` when `hess` cannot be inverted or the direction
/// `-H^{-1} g` is not finite.
pub fn adaptive_step(
    grad: &Array1<f64>,
    hess: &Array2<f64>,
    max_step: f64,
    metric: StepMetric,
) -> Option<AdaptiveStep> {
    let inv_hess = invert(hess)?;
    let inv_g = inv_hess.dot(grad);
    let direction = -&inv_g;
    let euclidean = norm(&direction);
    if !euclidean.is_finite() {
        return None;
    }
    if euclidean == 0.0 {
        return Some(AdaptiveStep {
            step: Array1::zeros(grad.len()),
            raw_length: 0.0,
            clamped: false,
        });
    }
    let delta = match metric {
        StepMetric::Euclidean => euclidean,
        StepMetric::Hessian => {
            let d_h_d = direction.dot(&hess.dot(&direction));
            if d_h_d > 0.0 && d_h_d.is_finite() {
                d_h_d.sqrt()
            } else {
                euclidean
            }
        }
    };
    let rho = grad.dot(&inv_g);
    let mut t = rho / ((rho + delta) * delta);
    if !t.is_finite() {
        t = 1.0;
    }
    let mut step = direction * t;
    let raw_length = norm(&step);
    let clamped = raw_length > max_step;
    if clamped {
        step *= max_step / raw_length;
    }
    Some(AdaptiveStep {
        step,
        raw_length,
        clamped,
    })
}
